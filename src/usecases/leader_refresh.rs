//! Leader Schedule Refresh - Out-of-band Gate Updates
//!
//! Periodically replaces the `LeaderScheduleSet` with the slots led by
//! the configured cooperating validators. A failed refresh keeps the
//! previous set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use solana_sdk::pubkey::Pubkey;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::leader_schedule::LeaderScheduleSet;
use crate::ports::chain_reader::ChainReader;

/// Keeps a `LeaderScheduleSet` current.
pub struct ScheduleRefresher<C: ChainReader> {
  reader: Arc<C>,
  schedule: Arc<LeaderScheduleSet>,
  identities: Vec<Pubkey>,
  period: Duration,
}

impl<C: ChainReader> ScheduleRefresher<C> {
  pub fn new(
    reader: Arc<C>,
    schedule: Arc<LeaderScheduleSet>,
    identities: Vec<Pubkey>,
    period: Duration,
  ) -> Self {
    Self {
      reader,
      schedule,
      identities,
      period,
    }
  }

  /// Fetch once and replace the set. Returns the number of slots.
  pub async fn refresh_once(&self) -> Result<usize> {
    let slots = self.reader.leader_slots(&self.identities).await?;
    let count = slots.len();
    self.schedule.replace(slots);
    Ok(count)
  }

  /// Refresh every `period` until cancelled.
  #[instrument(skip_all, name = "leader_refresh", fields(validators = self.identities.len()))]
  pub async fn run(&self, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(self.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => {
          info!("Leader schedule refresh stopped");
          return;
        }
        _ = ticker.tick() => {
          match self.refresh_once().await {
            Ok(slots) => info!(slots, "Leader schedule refreshed"),
            Err(e) => warn!(error = %e, kept = self.schedule.len(), "Leader schedule refresh failed"),
          }
        }
      }
    }
  }
}
