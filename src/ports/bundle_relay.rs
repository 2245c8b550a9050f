//! Bundle Relay Port - Atomic Submission to a Block-Construction Relay
//!
//! The relay accepts an ordered set of signed transactions and either
//! takes all of them as an inclusion candidate or rejects the bundle.
//! Acceptance is not a finality proof.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

/// Relay verdict on a submitted bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResponse {
  /// Accepted for candidate inclusion.
  Accepted {
    /// Relay-assigned bundle identifier.
    bundle_id: String,
  },
  /// Refused as a whole.
  Rejected {
    /// Relay-provided reason.
    reason: String,
    /// Offending transaction, if the relay names one.
    tx_index: Option<usize>,
  },
}

/// Failures talking to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
  /// Network or HTTP failure.
  #[error("relay transport: {0}")]
  Transport(String),

  /// Transactions could not be encoded.
  #[error("relay encode: {0}")]
  Encode(String),

  /// Response could not be interpreted.
  #[error("relay protocol: {0}")]
  Protocol(String),
}

/// Trait for bundle relays (e.g. a Jito block engine).
#[async_trait]
pub trait BundleRelay: Send + Sync + 'static {
  /// Submit the full ordered set as one atomic unit.
  async fn send_bundle(&self, transactions: &[VersionedTransaction]) -> Result<RelayResponse, RelayError>;

  /// Addresses the relay accepts tips on.
  async fn tip_accounts(&self) -> Result<Vec<Pubkey>, RelayError>;
}
