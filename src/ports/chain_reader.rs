//! Chain Reader Port - Point-in-time Account Reads
//!
//! Used off the hot path: the optional freeze-authority check, the
//! auto-sell balance lookups, latest-blockhash polling and leader
//! schedule refreshes.

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;

/// Trait for on-chain account reads via JSON-RPC.
#[async_trait]
pub trait ChainReader: Send + Sync + 'static {
  /// Raw data of an account, `None` if it does not exist.
  async fn account_data(&self, address: &Pubkey) -> anyhow::Result<Option<Vec<u8>>>;

  /// Raw balance of a token account, `None` if it does not exist.
  async fn token_balance(&self, token_account: &Pubkey) -> anyhow::Result<Option<u64>>;

  /// Most recent blockhash at `confirmed` commitment.
  async fn latest_blockhash(&self) -> anyhow::Result<Hash>;

  /// Absolute slots led by any of `identities` in the current epoch.
  async fn leader_slots(&self, identities: &[Pubkey]) -> anyhow::Result<Vec<u64>>;
}
