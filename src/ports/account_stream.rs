//! Account Stream Port - Filtered Real-time Account Subscriptions
//!
//! Both the market stream and the pool stream use this one shape; they
//! differ only in owner program and memcmp filters. Adapters turn a
//! `SubscriptionRequest` into a stream of `StreamRecord`s.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// How finalized a record must be before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
  /// Fastest: seen by the connected node, may still be dropped.
  #[default]
  Processed,
  /// Voted on by a supermajority.
  Confirmed,
  /// Rooted.
  Finalized,
}

impl Commitment {
  /// Wire name used by JSON-RPC.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Processed => "processed",
      Self::Confirmed => "confirmed",
      Self::Finalized => "finalized",
    }
  }
}

/// Byte-equality test at a fixed offset of the account data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcmpRule {
  /// Offset into the account data.
  pub offset: usize,
  /// Bytes expected at that offset.
  pub bytes: Vec<u8>,
}

impl MemcmpRule {
  pub fn new(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
    Self {
      offset,
      bytes: bytes.into(),
    }
  }

  /// Whether `data` satisfies this rule.
  pub fn matches(&self, data: &[u8]) -> bool {
    data
      .get(self.offset..self.offset + self.bytes.len())
      .is_some_and(|window| window == self.bytes.as_slice())
  }
}

/// Accounts owned by one program, narrowed by memcmp rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFilter {
  /// Owning program.
  pub owner: Pubkey,
  /// All rules must match.
  pub memcmp: Vec<MemcmpRule>,
}

impl AccountFilter {
  pub fn matches(&self, owner: &Pubkey, data: &[u8]) -> bool {
    &self.owner == owner && self.memcmp.iter().all(|rule| rule.matches(data))
  }
}

/// Everything a stream adapter needs to open one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
  /// Stream name for logs and metrics.
  pub name: String,
  /// Account filters (any may match).
  pub account_filters: Vec<AccountFilter>,
  /// Commitment for account notifications.
  pub commitment: Commitment,
  /// Also deliver block metadata (latest blockhash).
  pub block_meta: bool,
}

/// Account notification delivered by a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
  /// Slot the update was observed in.
  pub slot: u64,
  /// Account address.
  pub pubkey: Pubkey,
  /// Owning program.
  pub owner: Pubkey,
  /// Raw account data.
  pub data: Vec<u8>,
}

/// Item yielded by an account stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRecord {
  /// Account matching one of the filters.
  Account(AccountUpdate),
  /// Block metadata carrying a recent blockhash.
  BlockMeta {
    /// Block slot.
    slot: u64,
    /// Blockhash of that block.
    blockhash: Hash,
  },
}

/// Failures of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
  /// Connection or subscription request failed.
  #[error("stream connect failed: {0}")]
  Connect(String),

  /// Server sent something we cannot interpret as a stream item.
  #[error("stream protocol error: {0}")]
  Protocol(String),

  /// Server closed the stream.
  #[error("stream closed by server")]
  Closed,
}

/// Boxed stream of records; ends or yields an error on transport faults.
pub type RecordStream = BoxStream<'static, Result<StreamRecord, StreamError>>;

/// Trait for real-time account stream providers.
///
/// One call opens one long-lived subscription. Reconnection is the
/// caller's decision (see `StreamSupervisor`).
#[async_trait]
pub trait AccountStream: Send + Sync + 'static {
  /// Open a subscription for the given request.
  async fn subscribe(&self, request: &SubscriptionRequest) -> Result<RecordStream, StreamError>;
}
