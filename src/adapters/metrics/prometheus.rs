//! Prometheus Metrics Registry - Pipeline Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Covers correlation outcomes and latency, dispatch
//! outcomes, decode faults, ring buffer traffic and stream health.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::ports::telemetry::Telemetry;

/// Centralized Prometheus metrics for the sniper.
///
/// All metrics follow the naming convention `launch_sniper_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Market payloads written to the ring buffer.
    pub market_records: IntCounter,
    /// Ring buffer probes.
    pub ring_lookups: IntCounter,
    /// Payloads dropped for failing to decode, by stream.
    pub decode_errors: IntCounterVec,
    /// Correlation attempts by outcome.
    pub correlation_outcomes: IntCounterVec,
    /// Launch receipt to correlation outcome (milliseconds).
    pub correlation_latency_ms: HistogramVec,
    /// Dispatch attempts by outcome.
    pub dispatch_outcomes: IntCounterVec,
    /// Match to relay verdict (milliseconds).
    pub dispatch_latency_ms: HistogramVec,
    /// Delayed sells by outcome.
    pub sell_outcomes: IntCounterVec,
    /// Stream connection status (1 = connected, 0 = disconnected).
    pub stream_connected: IntGaugeVec,
    /// Stream reconnections.
    pub stream_reconnects: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let market_records = IntCounter::new(
            "launch_sniper_market_records_total",
            "Market payloads written to the ring buffer",
        )?;

        let ring_lookups = IntCounter::new(
            "launch_sniper_ring_lookups_total",
            "Ring buffer probes performed by the correlation engine",
        )?;

        let decode_errors = IntCounterVec::new(
            Opts::new(
                "launch_sniper_decode_errors_total",
                "Stream payloads dropped because they failed to decode",
            ),
            &["stream"],
        )?;

        let correlation_outcomes = IntCounterVec::new(
            Opts::new(
                "launch_sniper_correlation_outcomes_total",
                "Correlation attempts by terminal outcome",
            ),
            &["outcome"],
        )?;

        let correlation_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "launch_sniper_correlation_latency_ms",
                "Launch receipt to correlation outcome in milliseconds",
            )
            .buckets(vec![1.0, 5.0, 10.0, 15.0, 20.0, 30.0, 50.0, 100.0]),
            &["outcome"],
        )?;

        let dispatch_outcomes = IntCounterVec::new(
            Opts::new(
                "launch_sniper_dispatch_outcomes_total",
                "Bundle dispatch attempts by outcome",
            ),
            &["outcome"],
        )?;

        let dispatch_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "launch_sniper_dispatch_latency_ms",
                "Match to relay verdict in milliseconds",
            )
            .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
            &["outcome"],
        )?;

        let sell_outcomes = IntCounterVec::new(
            Opts::new(
                "launch_sniper_sell_outcomes_total",
                "Delayed sell attempts by outcome",
            ),
            &["outcome"],
        )?;

        let stream_connected = IntGaugeVec::new(
            Opts::new(
                "launch_sniper_stream_connected",
                "Stream connection status (1=connected, 0=disconnected)",
            ),
            &["stream"],
        )?;

        let stream_reconnects = IntCounterVec::new(
            Opts::new(
                "launch_sniper_stream_reconnects_total",
                "Stream reconnections",
            ),
            &["stream"],
        )?;

        // Register all metrics
        registry.register(Box::new(market_records.clone()))?;
        registry.register(Box::new(ring_lookups.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(correlation_outcomes.clone()))?;
        registry.register(Box::new(correlation_latency_ms.clone()))?;
        registry.register(Box::new(dispatch_outcomes.clone()))?;
        registry.register(Box::new(dispatch_latency_ms.clone()))?;
        registry.register(Box::new(sell_outcomes.clone()))?;
        registry.register(Box::new(stream_connected.clone()))?;
        registry.register(Box::new(stream_reconnects.clone()))?;

        Ok(Self {
            registry,
            market_records,
            ring_lookups,
            decode_errors,
            correlation_outcomes,
            correlation_latency_ms,
            dispatch_outcomes,
            dispatch_latency_ms,
            sell_outcomes,
            stream_connected,
            stream_reconnects,
        })
    }

    /// Record a stream connection transition.
    pub fn stream_transition(&self, stream: &str, connected: bool) {
        self.stream_connected
            .with_label_values(&[stream])
            .set(i64::from(connected));
        if !connected {
            self.stream_reconnects.with_label_values(&[stream]).inc();
        }
    }

    /// Render all metrics in the text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    metrics.render().map_err(|e| {
                        warn!(error = %e, "Failed to encode metrics");
                        StatusCode::INTERNAL_SERVER_ERROR
                    })
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1_000.0
}

impl Telemetry for MetricsRegistry {
    fn market_recorded(&self) {
        self.market_records.inc();
    }

    fn decode_failed(&self, stream: &str) {
        self.decode_errors.with_label_values(&[stream]).inc();
    }

    fn lookup_performed(&self) {
        self.ring_lookups.inc();
    }

    fn correlation_finished(&self, outcome: &str, elapsed: Duration) {
        self.correlation_outcomes.with_label_values(&[outcome]).inc();
        self.correlation_latency_ms
            .with_label_values(&[outcome])
            .observe(millis(elapsed));
    }

    fn dispatch_finished(&self, outcome: &str, elapsed: Duration) {
        self.dispatch_outcomes.with_label_values(&[outcome]).inc();
        self.dispatch_latency_ms
            .with_label_values(&[outcome])
            .observe(millis(elapsed));
    }

    fn sell_finished(&self, outcome: &str) {
        self.sell_outcomes.with_label_values(&[outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_renders_pipeline_counters() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.market_recorded();
        metrics.correlation_finished("matched", Duration::from_millis(12));
        metrics.dispatch_finished("submitted", Duration::from_millis(40));
        metrics.stream_transition("markets", false);

        let text = metrics.render().unwrap();
        assert!(text.contains("launch_sniper_market_records_total 1"));
        assert!(text.contains("launch_sniper_correlation_outcomes_total{outcome=\"matched\"} 1"));
        assert!(text.contains("launch_sniper_dispatch_outcomes_total{outcome=\"submitted\"} 1"));
        assert!(text.contains("launch_sniper_stream_reconnects_total{stream=\"markets\"} 1"));
    }
}
