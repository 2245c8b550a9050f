//! Correlation Engine - Launch to Market Matching
//!
//! Each `LaunchEvent` gets its own task that:
//! 1. Consults the leader gate (closed gate => abandoned, no lookup)
//! 2. Waits one poll interval, probes the ring buffer for the base mint
//! 3. Repeats up to the attempt budget, stopping on the first hit
//! 4. Hands a match to the dispatcher without awaiting it
//!
//! Tasks share nothing but the ring buffer, so one slow launch never
//! delays another. Shutdown cancels every in-flight attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::CorrelationConfig;
use crate::domain::bundle::DispatchOutcome;
use crate::domain::launch::{AbandonReason, CorrelationOutcome, LaunchEvent, MatchedLaunch};
use crate::domain::layout::MarketStateV3;
use crate::domain::leader_schedule::LeaderGate;
use crate::domain::ring_buffer::RingBuffer;
use crate::ports::telemetry::Telemetry;

use super::subscriber::LaunchSink;

/// Consumer of matched launches.
#[async_trait]
pub trait MatchDispatch: Send + Sync + 'static {
  /// Build, sign and submit for one match. Never fails outward.
  async fn dispatch(&self, matched: MatchedLaunch) -> DispatchOutcome;
}

/// Fixed poll cadence and attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
  pub interval: Duration,
  pub max_attempts: u32,
}

impl Default for PollBudget {
  fn default() -> Self {
    Self {
      interval: Duration::from_millis(10),
      max_attempts: 2,
    }
  }
}

impl From<&CorrelationConfig> for PollBudget {
  fn from(config: &CorrelationConfig) -> Self {
    Self {
      interval: Duration::from_millis(config.poll_interval_ms),
      max_attempts: config.max_attempts,
    }
  }
}

/// Joins launches with buffered markets and forwards matches.
pub struct CorrelationEngine<D: MatchDispatch> {
  /// Market payloads from the reference stream.
  ring: Arc<RingBuffer>,
  /// Advisory pre-check.
  gate: Arc<dyn LeaderGate>,
  /// Match consumer.
  dispatcher: Arc<D>,
  /// Poll cadence.
  budget: PollBudget,
  /// Outcome counters.
  telemetry: Arc<dyn Telemetry>,
  /// Parent of every per-attempt token.
  shutdown: CancellationToken,
}

impl<D: MatchDispatch> Clone for CorrelationEngine<D> {
  fn clone(&self) -> Self {
    Self {
      ring: Arc::clone(&self.ring),
      gate: Arc::clone(&self.gate),
      dispatcher: Arc::clone(&self.dispatcher),
      budget: self.budget,
      telemetry: Arc::clone(&self.telemetry),
      shutdown: self.shutdown.clone(),
    }
  }
}

impl<D: MatchDispatch> CorrelationEngine<D> {
  /// Create a new engine.
  pub fn new(
    ring: Arc<RingBuffer>,
    gate: Arc<dyn LeaderGate>,
    dispatcher: Arc<D>,
    budget: PollBudget,
    telemetry: Arc<dyn Telemetry>,
    shutdown: CancellationToken,
  ) -> Self {
    Self {
      ring,
      gate,
      dispatcher,
      budget,
      telemetry,
      shutdown,
    }
  }

  /// Poll budget in use.
  pub fn budget(&self) -> PollBudget {
    self.budget
  }

  /// Drive one launch to a terminal outcome.
  ///
  /// Does not dispatch; `spawn` does that on `Matched`.
  pub async fn resolve(&self, event: &LaunchEvent, cancel: &CancellationToken) -> CorrelationOutcome {
    if !self.gate.should_attempt(event.slot) {
      return CorrelationOutcome::Abandoned(AbandonReason::GateClosed);
    }

    let key = event.correlation_key();

    for attempt in 1..=self.budget.max_attempts {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          return CorrelationOutcome::Abandoned(AbandonReason::Cancelled);
        }
        _ = tokio::time::sleep(self.budget.interval) => {}
      }

      self.telemetry.lookup_performed();
      let Some(record) = self.ring.find_pattern(&key) else {
        debug!(attempt, "Market not buffered yet");
        continue;
      };

      return match MarketStateV3::decode(&record.payload) {
        Ok(market) => {
          debug!(attempt, sequence = record.sequence, "Market found");
          CorrelationOutcome::Matched(Box::new(MatchedLaunch {
            launch: event.clone(),
            market: market.keys(),
          }))
        }
        Err(e) => {
          warn!(error = %e, sequence = record.sequence, "Matched market failed to decode");
          CorrelationOutcome::Abandoned(AbandonReason::MarketDecode(e))
        }
      };
    }

    CorrelationOutcome::Abandoned(AbandonReason::Exhausted {
      attempts: self.budget.max_attempts,
    })
  }

  /// Run `resolve` on its own task and forward a match to the dispatcher.
  ///
  /// The handle yields the correlation outcome; dispatch runs on a
  /// separate task that nobody awaits.
  pub fn spawn(&self, event: LaunchEvent) -> JoinHandle<CorrelationOutcome> {
    let engine = self.clone();
    let cancel = self.shutdown.child_token();
    let span = info_span!(
      "correlation",
      attempt_id = %Uuid::new_v4(),
      pool = %event.pool_id,
      base_mint = %event.pool.base_mint,
      slot = event.slot
    );

    tokio::spawn(
      async move {
        let started = Instant::now();
        let outcome = engine.resolve(&event, &cancel).await;
        let elapsed = started.elapsed();
        engine.telemetry.correlation_finished(outcome.label(), elapsed);

        match &outcome {
          CorrelationOutcome::Matched(matched) => {
            info!(elapsed_us = elapsed.as_micros() as u64, "Launch correlated, dispatching");
            let dispatcher = Arc::clone(&engine.dispatcher);
            let matched = matched.as_ref().clone();
            tokio::spawn(
              async move {
                dispatcher.dispatch(matched).await;
              }
              .in_current_span(),
            );
          }
          CorrelationOutcome::Abandoned(reason) => {
            info!(
              reason = reason.label(),
              elapsed_us = elapsed.as_micros() as u64,
              "Launch abandoned"
            );
          }
        }

        outcome
      }
      .instrument(span),
    )
  }
}

impl<D: MatchDispatch> LaunchSink for CorrelationEngine<D> {
  fn on_launch(&self, event: LaunchEvent) {
    drop(self.spawn(event));
  }
}

#[cfg(test)]
mod tests {
  use parking_lot::Mutex;
  use solana_sdk::pubkey::Pubkey;
  use solana_sdk::signature::Signature;

  use super::*;
  use crate::domain::layout::{LiquidityStateV4, fixtures, market_offsets};
  use crate::domain::leader_schedule::{AlwaysAttempt, LeaderScheduleSet, ScheduleGate};
  use crate::domain::swap::{OPENBOOK_PROGRAM, WSOL_MINT};
  use crate::ports::telemetry::NoopTelemetry;

  #[derive(Default)]
  struct Recorder(Mutex<Vec<MatchedLaunch>>);

  #[async_trait]
  impl MatchDispatch for Recorder {
    async fn dispatch(&self, matched: MatchedLaunch) -> DispatchOutcome {
      self.0.lock().push(matched);
      DispatchOutcome::Submitted {
        bundle_id: "test".into(),
        signature: Signature::default(),
      }
    }
  }

  fn engine(gate: Arc<dyn LeaderGate>) -> (CorrelationEngine<Recorder>, Arc<RingBuffer>, Arc<Recorder>) {
    let ring = Arc::new(RingBuffer::with_key_offset(16, market_offsets::BASE_MINT));
    let recorder = Arc::new(Recorder::default());
    let engine = CorrelationEngine::new(
      Arc::clone(&ring),
      gate,
      Arc::clone(&recorder),
      PollBudget::default(),
      Arc::new(NoopTelemetry),
      CancellationToken::new(),
    );
    (engine, ring, recorder)
  }

  fn launch(base_mint: &Pubkey, slot: u64) -> LaunchEvent {
    let data = fixtures::pool_bytes(base_mint, &WSOL_MINT, &Pubkey::new_unique(), &OPENBOOK_PROGRAM);
    LaunchEvent {
      pool_id: Pubkey::new_unique(),
      slot,
      pool: LiquidityStateV4::decode(&data).unwrap(),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_buffered_market_matches_on_first_poll() {
    let (engine, ring, _) = engine(Arc::new(AlwaysAttempt));
    let base = Pubkey::new_unique();
    ring.enqueue(fixtures::market_bytes(&Pubkey::new_unique(), &base, &WSOL_MINT));

    let outcome = engine.resolve(&launch(&base, 1), &CancellationToken::new()).await;
    assert!(outcome.is_matched());
    assert_eq!(ring.lookups(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_missing_market_exhausts_budget() {
    let (engine, ring, _) = engine(Arc::new(AlwaysAttempt));
    let outcome = engine
      .resolve(&launch(&Pubkey::new_unique(), 1), &CancellationToken::new())
      .await;

    assert_eq!(
      outcome,
      CorrelationOutcome::Abandoned(AbandonReason::Exhausted { attempts: 2 })
    );
    assert_eq!(ring.lookups(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_closed_gate_skips_lookup() {
    let schedule = Arc::new(LeaderScheduleSet::new());
    schedule.replace([100]);
    let (engine, ring, _) = engine(Arc::new(ScheduleGate::new(schedule)));

    let outcome = engine
      .resolve(&launch(&Pubkey::new_unique(), 5), &CancellationToken::new())
      .await;
    assert_eq!(outcome, CorrelationOutcome::Abandoned(AbandonReason::GateClosed));
    assert_eq!(ring.lookups(), 0);

    let outcome = engine
      .resolve(&launch(&Pubkey::new_unique(), 99), &CancellationToken::new())
      .await;
    assert!(matches!(outcome, CorrelationOutcome::Abandoned(AbandonReason::Exhausted { .. })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_stops_polling() {
    let (engine, ring, _) = engine(Arc::new(AlwaysAttempt));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = engine.resolve(&launch(&Pubkey::new_unique(), 1), &cancel).await;
    assert_eq!(outcome, CorrelationOutcome::Abandoned(AbandonReason::Cancelled));
    assert_eq!(ring.lookups(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_spawn_forwards_match_to_dispatcher() {
    let (engine, ring, recorder) = engine(Arc::new(AlwaysAttempt));
    let base = Pubkey::new_unique();
    let event = launch(&base, 7);
    ring.enqueue(fixtures::market_bytes(&Pubkey::new_unique(), &base, &WSOL_MINT));

    let outcome = engine.spawn(event.clone()).await.unwrap();
    assert!(outcome.is_matched());

    // Let the detached dispatch task run.
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    let dispatched = recorder.0.lock();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].launch, event);
  }
}
