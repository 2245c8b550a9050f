//! Telemetry Port - Pipeline Observations
//!
//! Usecases report what happened through this trait; the Prometheus
//! registry implements it. Every method has a no-op default so tests and
//! tools can pass `NoopTelemetry`.

use std::time::Duration;

/// Sink for pipeline counters and latencies.
pub trait Telemetry: Send + Sync + 'static {
  /// A market payload entered the ring buffer.
  fn market_recorded(&self) {}

  /// A payload on `stream` failed to decode and was dropped.
  fn decode_failed(&self, _stream: &str) {}

  /// One ring buffer probe was performed.
  fn lookup_performed(&self) {}

  /// A correlation attempt finished.
  fn correlation_finished(&self, _outcome: &str, _elapsed: Duration) {}

  /// A dispatch attempt finished.
  fn dispatch_finished(&self, _outcome: &str, _elapsed: Duration) {}

  /// A delayed sell finished.
  fn sell_finished(&self, _outcome: &str) {}
}

/// Discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}
