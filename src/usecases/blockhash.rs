//! Blockhash Poller - RPC Fallback for the Latest Blockhash
//!
//! Block notifications are optional on most PubSub endpoints. This task
//! polls `getLatestBlockhash` and publishes into the same `watch` channel
//! the launch stream feeds, so dispatch always has a recent hash. A
//! failed poll leaves the previous value in place.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use solana_sdk::hash::Hash;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::ports::chain_reader::ChainReader;

/// Keeps the latest-blockhash channel populated from RPC.
pub struct BlockhashPoller<C: ChainReader> {
  reader: Arc<C>,
  latest: watch::Sender<Option<Hash>>,
  period: Duration,
}

impl<C: ChainReader> BlockhashPoller<C> {
  pub fn new(reader: Arc<C>, latest: watch::Sender<Option<Hash>>, period: Duration) -> Self {
    Self {
      reader,
      latest,
      period,
    }
  }

  /// Fetch once and publish. Returns the published hash.
  pub async fn poll_once(&self) -> Result<Hash> {
    let hash = self.reader.latest_blockhash().await?;
    self.latest.send_if_modified(|current| {
      let changed = *current != Some(hash);
      *current = Some(hash);
      changed
    });
    Ok(hash)
  }

  /// Poll every `period` until cancelled.
  #[instrument(skip_all, name = "blockhash_poll", fields(period_ms = self.period.as_millis() as u64))]
  pub async fn run(&self, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(self.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => {
          info!("Blockhash polling stopped");
          return;
        }
        _ = ticker.tick() => {
          match self.poll_once().await {
            Ok(hash) => debug!(%hash, "Blockhash refreshed"),
            Err(e) => warn!(error = %e, "Blockhash poll failed"),
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use async_trait::async_trait;
  use solana_sdk::pubkey::Pubkey;

  use super::*;

  struct FixedHash {
    hash: Hash,
    fail: AtomicBool,
  }

  #[async_trait]
  impl ChainReader for FixedHash {
    async fn account_data(&self, _address: &Pubkey) -> Result<Option<Vec<u8>>> {
      Ok(None)
    }

    async fn token_balance(&self, _token_account: &Pubkey) -> Result<Option<u64>> {
      Ok(None)
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
      if self.fail.load(Ordering::SeqCst) {
        anyhow::bail!("rpc down");
      }
      Ok(self.hash)
    }

    async fn leader_slots(&self, _identities: &[Pubkey]) -> Result<Vec<u64>> {
      Ok(Vec::new())
    }
  }

  #[tokio::test]
  async fn test_poll_publishes_and_failure_keeps_previous() {
    let hash = Hash::new_unique();
    let reader = Arc::new(FixedHash {
      hash,
      fail: AtomicBool::new(false),
    });
    let (tx, rx) = watch::channel(None);
    let poller = BlockhashPoller::new(Arc::clone(&reader), tx, Duration::from_secs(1));

    assert_eq!(poller.poll_once().await.unwrap(), hash);
    assert_eq!(*rx.borrow(), Some(hash));

    reader.fail.store(true, Ordering::SeqCst);
    assert!(poller.poll_once().await.is_err());
    assert_eq!(*rx.borrow(), Some(hash));
  }

  #[tokio::test(start_paused = true)]
  async fn test_run_fills_empty_channel_then_stops() {
    let hash = Hash::new_unique();
    let reader = Arc::new(FixedHash {
      hash,
      fail: AtomicBool::new(false),
    });
    let (tx, mut rx) = watch::channel(None);
    let poller = BlockhashPoller::new(reader, tx, Duration::from_millis(500));
    let shutdown = CancellationToken::new();

    let handle = {
      let shutdown = shutdown.clone();
      tokio::spawn(async move { poller.run(shutdown).await })
    };
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), Some(hash));

    shutdown.cancel();
    handle.await.unwrap();
  }
}
