//! Bundle Model - Atomic Transaction Sets with a Priority Tip
//!
//! A bundle is an ordered list of signed transactions whose last entry
//! pays a tip to one of the relay's tip accounts. The relay lands all of
//! them together or none of them.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use rand::seq::SliceRandom;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

/// Block-engine limit on transactions per bundle.
pub const MAX_BUNDLE_LEN: usize = 5;

/// Errors raised while building or submitting a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Local submission rate limit hit.
    #[error("bundle submission rate limited")]
    RateLimited,

    /// Pool or market keys could not be derived.
    #[error("failed to build transaction: {0}")]
    Build(String),

    /// A transaction could not be signed.
    #[error("failed to sign transaction: {0}")]
    Signing(String),

    /// The relay refused the bundle.
    #[error("relay rejected bundle: {reason}")]
    Rejected {
        reason: String,
        /// Index of the offending transaction, when the relay names one.
        tx_index: Option<usize>,
    },

    /// The relay could not be reached.
    #[error("relay transport error: {0}")]
    Transport(String),

    /// Mint carries a freeze authority and the check is enabled.
    #[error("mint has a freeze authority")]
    FreezeAuthority,

    /// Bundle would exceed the block-engine limit.
    #[error("bundle of {0} transactions exceeds limit of {MAX_BUNDLE_LEN}")]
    TooLarge(usize),
}

impl DispatchError {
    /// Metric label for this error.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Build(_) => "build",
            Self::Signing(_) => "signing",
            Self::Rejected { .. } => "rejected",
            Self::Transport(_) => "transport",
            Self::FreezeAuthority => "freeze_authority",
            Self::TooLarge(_) => "too_large",
        }
    }
}

/// Result of one dispatch attempt. Never partially accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted by the relay for candidate inclusion.
    Submitted {
        bundle_id: String,
        /// Signature of the primary (first) transaction.
        signature: Signature,
    },
    /// Nothing from this bundle was accepted.
    Rejected(DispatchError),
}

impl DispatchOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Rejected(err) => err.label(),
        }
    }
}

/// Ordered, signed transactions with the tip transfer last.
#[derive(Debug, Clone)]
pub struct Bundle {
    transactions: Vec<VersionedTransaction>,
    tip_account: Pubkey,
    tip_lamports: u64,
}

impl Bundle {
    /// Assemble a bundle from primary transactions and a tip transaction.
    ///
    /// # Errors
    /// Returns `DispatchError::TooLarge` if the total exceeds the limit.
    pub fn new(
        mut primary: Vec<VersionedTransaction>,
        tip: VersionedTransaction,
        tip_account: Pubkey,
        tip_lamports: u64,
    ) -> Result<Self, DispatchError> {
        primary.push(tip);
        if primary.len() > MAX_BUNDLE_LEN {
            return Err(DispatchError::TooLarge(primary.len()));
        }
        Ok(Self {
            transactions: primary,
            tip_account,
            tip_lamports,
        })
    }

    pub fn transactions(&self) -> &[VersionedTransaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn tip_account(&self) -> Pubkey {
        self.tip_account
    }

    pub fn tip_lamports(&self) -> u64 {
        self.tip_lamports
    }

    /// First signature of the first transaction.
    pub fn primary_signature(&self) -> Signature {
        self.transactions
            .first()
            .and_then(|tx| tx.signatures.first().copied())
            .unwrap_or_default()
    }
}

/// Serialize transactions for the relay wire format (bincode, base64).
///
/// # Errors
/// Returns the bincode error if a transaction fails to serialize.
pub fn encode_transactions(transactions: &[VersionedTransaction]) -> Result<Vec<String>, bincode::Error> {
    transactions
        .iter()
        .map(|tx| bincode::serialize(tx).map(|bytes| BASE64.encode(bytes)))
        .collect()
}

/// Fixed allow-list of tip-receiving addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipAccounts {
    accounts: Vec<Pubkey>,
}

impl TipAccounts {
    /// Wrap a non-empty allow-list.
    pub fn new(accounts: Vec<Pubkey>) -> Option<Self> {
        if accounts.is_empty() {
            None
        } else {
            Some(Self { accounts })
        }
    }

    pub fn as_slice(&self) -> &[Pubkey] {
        &self.accounts
    }

    /// Pick one address uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Pubkey {
        // Non-empty by construction.
        *self.accounts.choose(rng).unwrap_or(&self.accounts[0])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_tip_accounts_reject_empty() {
        assert!(TipAccounts::new(Vec::new()).is_none());
    }

    #[test]
    fn test_tip_choice_stays_in_allow_list_and_spreads() {
        let list: Vec<_> = (0..4).map(|_| Pubkey::new_unique()).collect();
        let tips = TipAccounts::new(list.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let picked: HashSet<_> = (0..200).map(|_| tips.choose(&mut rng)).collect();
        assert!(picked.iter().all(|p| list.contains(p)));
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn test_bundle_puts_tip_last_and_enforces_limit() {
        let tx = VersionedTransaction::default();
        let tip_account = Pubkey::new_unique();

        let bundle = Bundle::new(vec![tx.clone()], tx.clone(), tip_account, 10).unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.tip_account(), tip_account);

        let err = Bundle::new(vec![tx.clone(); 5], tx, tip_account, 10).unwrap_err();
        assert_eq!(err, DispatchError::TooLarge(6));
    }

    #[test]
    fn test_outcome_labels() {
        let ok = DispatchOutcome::Submitted {
            bundle_id: "b".into(),
            signature: Signature::default(),
        };
        assert!(ok.is_submitted());
        assert_eq!(ok.label(), "submitted");
        assert_eq!(DispatchOutcome::Rejected(DispatchError::RateLimited).label(), "rate_limited");
    }
}
