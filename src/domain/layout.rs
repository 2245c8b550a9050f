//! Account Layouts - Fixed-Offset Decoders for Streamed Accounts
//!
//! Raydium AMM v4 pool state and OpenBook (Serum v3) market state are
//! decoded by reading fields at schema-constant offsets. Record kind is
//! chosen from the payload length, so a malformed account is a typed
//! `LayoutError` and never a panic.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Size of a Raydium `LIQUIDITY_STATE_LAYOUT_V4` account.
pub const POOL_STATE_LEN: usize = 752;
/// Size of an OpenBook `MARKET_STATE_LAYOUT_V3` account.
pub const MARKET_STATE_LEN: usize = 388;
/// Size of an SPL token mint account.
pub const MINT_LEN: usize = 82;

/// Byte offsets inside the AMM v4 pool state.
pub mod pool_offsets {
    pub const BASE_DECIMAL: usize = 32;
    pub const QUOTE_DECIMAL: usize = 40;
    pub const POOL_OPEN_TIME: usize = 224;
    pub const SWAP_QUOTE_IN_AMOUNT: usize = 296;
    pub const SWAP_BASE_OUT_AMOUNT: usize = 312;
    pub const BASE_VAULT: usize = 336;
    pub const QUOTE_VAULT: usize = 368;
    pub const BASE_MINT: usize = 400;
    pub const QUOTE_MINT: usize = 432;
    pub const LP_MINT: usize = 464;
    pub const OPEN_ORDERS: usize = 496;
    pub const MARKET_ID: usize = 528;
    pub const MARKET_PROGRAM_ID: usize = 560;
    pub const TARGET_ORDERS: usize = 592;
    pub const WITHDRAW_QUEUE: usize = 624;
    pub const LP_VAULT: usize = 656;
}

/// Byte offsets inside the OpenBook v3 market state.
pub mod market_offsets {
    pub const OWN_ADDRESS: usize = 13;
    pub const VAULT_SIGNER_NONCE: usize = 45;
    pub const BASE_MINT: usize = 53;
    pub const QUOTE_MINT: usize = 85;
    pub const BASE_VAULT: usize = 117;
    pub const QUOTE_VAULT: usize = 165;
    pub const EVENT_QUEUE: usize = 253;
    pub const BIDS: usize = 285;
    pub const ASKS: usize = 317;
}

/// Byte offsets inside an SPL mint.
pub mod mint_offsets {
    pub const DECIMALS: usize = 44;
    pub const FREEZE_AUTHORITY_OPTION: usize = 46;
}

/// Errors raised while decoding an account payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Payload length matches no known record kind.
    #[error("unrecognized account length {0}")]
    UnknownLength(usize),

    /// Payload shorter than the layout requires.
    #[error("{layout} needs {expected} bytes, got {actual}")]
    Truncated {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Decoded Raydium AMM v4 pool state (fields used downstream only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityStateV4 {
    pub base_decimal: u64,
    pub quote_decimal: u64,
    pub pool_open_time: u64,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
    pub lp_vault: Pubkey,
}

impl LiquidityStateV4 {
    /// Decode a pool state account.
    ///
    /// # Errors
    /// Returns `LayoutError::Truncated` if the payload is too short.
    pub fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        use pool_offsets as o;
        ensure_len("LiquidityStateV4", data, POOL_STATE_LEN)?;

        Ok(Self {
            base_decimal: read_u64(data, o::BASE_DECIMAL),
            quote_decimal: read_u64(data, o::QUOTE_DECIMAL),
            pool_open_time: read_u64(data, o::POOL_OPEN_TIME),
            base_vault: read_pubkey(data, o::BASE_VAULT),
            quote_vault: read_pubkey(data, o::QUOTE_VAULT),
            base_mint: read_pubkey(data, o::BASE_MINT),
            quote_mint: read_pubkey(data, o::QUOTE_MINT),
            lp_mint: read_pubkey(data, o::LP_MINT),
            open_orders: read_pubkey(data, o::OPEN_ORDERS),
            market_id: read_pubkey(data, o::MARKET_ID),
            market_program_id: read_pubkey(data, o::MARKET_PROGRAM_ID),
            target_orders: read_pubkey(data, o::TARGET_ORDERS),
            withdraw_queue: read_pubkey(data, o::WITHDRAW_QUEUE),
            lp_vault: read_pubkey(data, o::LP_VAULT),
        })
    }
}

/// Decoded OpenBook v3 market state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketStateV3 {
    pub own_address: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
}

impl MarketStateV3 {
    /// Decode a market state account.
    ///
    /// # Errors
    /// Returns `LayoutError::Truncated` if the payload is too short.
    pub fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        use market_offsets as o;
        ensure_len("MarketStateV3", data, MARKET_STATE_LEN)?;

        Ok(Self {
            own_address: read_pubkey(data, o::OWN_ADDRESS),
            vault_signer_nonce: read_u64(data, o::VAULT_SIGNER_NONCE),
            base_mint: read_pubkey(data, o::BASE_MINT),
            quote_mint: read_pubkey(data, o::QUOTE_MINT),
            base_vault: read_pubkey(data, o::BASE_VAULT),
            quote_vault: read_pubkey(data, o::QUOTE_VAULT),
            event_queue: read_pubkey(data, o::EVENT_QUEUE),
            bids: read_pubkey(data, o::BIDS),
            asks: read_pubkey(data, o::ASKS),
        })
    }

    /// Keep only what the swap instruction needs from the market.
    pub fn keys(&self) -> MarketKeys {
        MarketKeys {
            bids: self.bids,
            asks: self.asks,
            event_queue: self.event_queue,
            base_vault: self.base_vault,
            quote_vault: self.quote_vault,
            vault_signer_nonce: self.vault_signer_nonce,
        }
    }
}

/// Minimal market subset carried from a correlation hit to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketKeys {
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub event_queue: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub vault_signer_nonce: u64,
}

/// Tagged record kind selected by payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedAccount {
    /// AMM v4 pool (launch stream).
    Pool(Box<LiquidityStateV4>),
    /// OpenBook v3 market (reference stream).
    Market(Box<MarketStateV3>),
}

impl DecodedAccount {
    /// Decode any supported account by its length.
    ///
    /// # Errors
    /// Returns `LayoutError::UnknownLength` for unsupported payloads.
    pub fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        match data.len() {
            POOL_STATE_LEN => Ok(Self::Pool(Box::new(LiquidityStateV4::decode(data)?))),
            MARKET_STATE_LEN => Ok(Self::Market(Box::new(MarketStateV3::decode(data)?))),
            other => Err(LayoutError::UnknownLength(other)),
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pool(_) => "pool",
            Self::Market(_) => "market",
        }
    }
}

/// Decoded subset of an SPL mint account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintInfo {
    pub decimals: u8,
    pub has_freeze_authority: bool,
}

impl MintInfo {
    /// Decode an SPL mint account.
    ///
    /// # Errors
    /// Returns `LayoutError::Truncated` if the payload is too short.
    pub fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        ensure_len("Mint", data, MINT_LEN)?;
        Ok(Self {
            decimals: data[mint_offsets::DECIMALS],
            has_freeze_authority: read_u32(data, mint_offsets::FREEZE_AUTHORITY_OPTION) != 0,
        })
    }
}

fn ensure_len(layout: &'static str, data: &[u8], expected: usize) -> Result<(), LayoutError> {
    if data.len() < expected {
        return Err(LayoutError::Truncated {
            layout,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

// Callers check the length first, so the slices below are in bounds.

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(bytes)
}

/// Synthetic account payloads for tests and benchmarks.
#[doc(hidden)]
pub mod fixtures {
    use super::*;

    /// Build a pool payload with the given mints and market.
    pub fn pool_bytes(base_mint: &Pubkey, quote_mint: &Pubkey, market_id: &Pubkey, market_program: &Pubkey) -> Vec<u8> {
        use pool_offsets as o;
        let mut data = vec![0u8; POOL_STATE_LEN];
        data[o::BASE_DECIMAL..o::BASE_DECIMAL + 8].copy_from_slice(&6u64.to_le_bytes());
        data[o::QUOTE_DECIMAL..o::QUOTE_DECIMAL + 8].copy_from_slice(&9u64.to_le_bytes());
        for (offset, key) in [
            (o::BASE_VAULT, Pubkey::new_unique()),
            (o::QUOTE_VAULT, Pubkey::new_unique()),
            (o::BASE_MINT, *base_mint),
            (o::QUOTE_MINT, *quote_mint),
            (o::LP_MINT, Pubkey::new_unique()),
            (o::OPEN_ORDERS, Pubkey::new_unique()),
            (o::MARKET_ID, *market_id),
            (o::MARKET_PROGRAM_ID, *market_program),
            (o::TARGET_ORDERS, Pubkey::new_unique()),
            (o::WITHDRAW_QUEUE, Pubkey::new_unique()),
            (o::LP_VAULT, Pubkey::new_unique()),
        ] {
            data[offset..offset + 32].copy_from_slice(key.as_ref());
        }
        data
    }

    /// Build a market payload for the given base/quote mints.
    pub fn market_bytes(own_address: &Pubkey, base_mint: &Pubkey, quote_mint: &Pubkey) -> Vec<u8> {
        use market_offsets as o;
        let mut data = vec![0u8; MARKET_STATE_LEN];
        data[o::VAULT_SIGNER_NONCE..o::VAULT_SIGNER_NONCE + 8].copy_from_slice(&1u64.to_le_bytes());
        for (offset, key) in [
            (o::OWN_ADDRESS, *own_address),
            (o::BASE_MINT, *base_mint),
            (o::QUOTE_MINT, *quote_mint),
            (o::BASE_VAULT, Pubkey::new_unique()),
            (o::QUOTE_VAULT, Pubkey::new_unique()),
            (o::EVENT_QUEUE, Pubkey::new_unique()),
            (o::BIDS, Pubkey::new_unique()),
            (o::ASKS, Pubkey::new_unique()),
        ] {
            data[offset..offset + 32].copy_from_slice(key.as_ref());
        }
        data
    }
}
