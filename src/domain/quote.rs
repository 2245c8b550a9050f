//! Quote Token - The Currency Spent on Each Buy
//!
//! Only WSOL and USDC are supported as quote mints. Amounts arrive from
//! configuration as human decimals and are converted to raw base units
//! once at startup.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;

use super::swap::{USDC_MINT, WSOL_MINT};

/// Supported quote currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteToken {
    Wsol,
    Usdc,
}

impl QuoteToken {
    pub fn mint(self) -> Pubkey {
        match self {
            Self::Wsol => WSOL_MINT,
            Self::Usdc => USDC_MINT,
        }
    }

    pub fn decimals(self) -> u32 {
        match self {
            Self::Wsol => 9,
            Self::Usdc => 6,
        }
    }

    /// Convert a human amount (e.g. `0.01`) into raw base units.
    ///
    /// Returns `None` for negative or overflowing amounts.
    pub fn to_raw(self, amount: Decimal) -> Option<u64> {
        if amount.is_sign_negative() {
            return None;
        }
        let scale = Decimal::from(10u64.pow(self.decimals()));
        amount.checked_mul(scale)?.trunc().to_u64()
    }
}

impl fmt::Display for QuoteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wsol => write!(f, "WSOL"),
            Self::Usdc => write!(f, "USDC"),
        }
    }
}

impl FromStr for QuoteToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WSOL" => Ok(Self::Wsol),
            "USDC" => Ok(Self::Usdc),
            other => Err(format!(
                "Unsupported quote mint \"{other}\". Supported values are USDC and WSOL"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_to_raw_uses_mint_decimals() {
        assert_eq!(QuoteToken::Wsol.to_raw(dec!(0.01)), Some(10_000_000));
        assert_eq!(QuoteToken::Usdc.to_raw(dec!(2.5)), Some(2_500_000));
        assert_eq!(QuoteToken::Usdc.to_raw(dec!(0.0000001)), Some(0));
        assert_eq!(QuoteToken::Wsol.to_raw(dec!(-1)), None);
    }

    #[test]
    fn test_parse_quote_token() {
        assert_eq!("wsol".parse::<QuoteToken>(), Ok(QuoteToken::Wsol));
        assert_eq!(QuoteToken::Usdc.mint(), USDC_MINT);
        assert!("BONK".parse::<QuoteToken>().is_err());
    }
}
