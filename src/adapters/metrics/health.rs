//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for Docker
//! health checks and monitoring. Readiness depends on every
//! supervised account stream being connected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::adapters::stream::StreamHealth;

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    /// Supervised streams.
    streams: Vec<Arc<StreamHealth>>,
    /// Whether the pipeline is accepting launches.
    pipeline_running: AtomicBool,
}

impl HealthState {
    /// Create a health state over the given streams.
    pub fn new(streams: Vec<Arc<StreamHealth>>) -> Self {
        Self {
            streams,
            pipeline_running: AtomicBool::new(true),
        }
    }

    /// Flag the pipeline as stopped (fatal stream loss, shutdown).
    pub fn set_pipeline_running(&self, running: bool) {
        self.pipeline_running.store(running, Ordering::Relaxed);
    }

    /// Check if the system is ready to snipe.
    pub fn is_ready(&self) -> bool {
        self.pipeline_running.load(Ordering::Relaxed)
            && self.streams.iter().all(|stream| stream.is_connected())
    }
}

/// Axum-based health check HTTP server.
///
/// Serves liveness (/live) and readiness (/ready) endpoints for
/// Docker health checks and orchestrator probes.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Start the health check server in the background.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: returns 200 only if all streams are connected.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_until_streams_connect() {
        let state = HealthState::new(vec![Arc::new(StreamHealth::new("markets"))]);
        assert!(!state.is_ready());

        let empty = HealthState::new(Vec::new());
        assert!(empty.is_ready());
        empty.set_pipeline_running(false);
        assert!(!empty.is_ready());
    }
}
