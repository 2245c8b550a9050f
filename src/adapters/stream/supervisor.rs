//! Stream Supervisor - Reconnecting Lifecycle for Account Streams
//!
//! Wraps any `AccountStream` with automatic resubscription under an
//! explicit `ReconnectPolicy`. Records are handed to a callback inline
//! on the supervising task so no queue sits between the socket and the
//! ring buffer. Health is exposed for the /ready endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::ReconnectConfig;
use crate::ports::account_stream::{AccountStream, StreamError, StreamRecord, SubscriptionRequest};

/// Exponential backoff with a cap and an optional failure budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any retry delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up (`None` = forever).
    pub max_consecutive_failures: Option<u32>,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether `failures` consecutive failures exhaust the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_consecutive_failures
            .is_some_and(|limit| failures >= limit)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_consecutive_failures: (config.max_consecutive_failures > 0)
                .then_some(config.max_consecutive_failures),
        }
    }
}

/// Terminal failure of a supervised stream.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("stream {name} gave up after {failures} consecutive failures: {last}")]
    Exhausted {
        name: String,
        failures: u32,
        last: StreamError,
    },
}

/// Health of one supervised stream.
#[derive(Debug)]
pub struct StreamHealth {
    /// Stream name for logging and metric labels.
    name: String,
    /// Whether a session is currently delivering.
    connected: AtomicBool,
    /// Total reconnections since start.
    reconnects: AtomicU64,
}

impl StreamHealth {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

/// Callback told about connection transitions (for metrics gauges).
pub type ConnectionHook = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Supervises one subscription against an `AccountStream`.
pub struct StreamSupervisor<S: AccountStream> {
    /// Underlying stream adapter.
    stream: Arc<S>,
    /// Retry policy.
    policy: ReconnectPolicy,
    /// Health tracker shared with the health server.
    health: Arc<StreamHealth>,
    /// Optional connection transition hook.
    on_connection: Option<ConnectionHook>,
}

impl<S: AccountStream> StreamSupervisor<S> {
    /// Create a supervisor for `name` with the given policy.
    pub fn new(stream: Arc<S>, policy: ReconnectPolicy, name: impl Into<String>) -> Self {
        Self {
            stream,
            policy,
            health: Arc::new(StreamHealth::new(name)),
            on_connection: None,
        }
    }

    /// Report connection transitions to `hook`.
    #[must_use]
    pub fn with_connection_hook(mut self, hook: ConnectionHook) -> Self {
        self.on_connection = Some(hook);
        self
    }

    /// Shared health handle.
    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.health)
    }

    /// Run the subscription until cancelled or the failure budget is spent.
    ///
    /// A session counts as healthy once it delivers its first record;
    /// that resets the consecutive failure counter.
    ///
    /// # Errors
    /// Returns `SupervisorError::Exhausted` when the policy gives up.
    #[instrument(skip_all, fields(stream = %request.name))]
    pub async fn run<F>(
        &self,
        request: SubscriptionRequest,
        mut on_record: F,
        cancel: CancellationToken,
    ) -> Result<(), SupervisorError>
    where
        F: FnMut(StreamRecord) + Send,
    {
        let mut failures = 0u32;

        loop {
            let last = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.mark(false);
                    info!("Stream supervisor shut down gracefully");
                    return Ok(());
                }
                ended = self.session(&request, &mut on_record, &mut failures) => ended,
            };

            self.mark(false);
            failures += 1;

            if self.policy.exhausted(failures) {
                error!(failures, error = %last, "Stream failure budget exhausted");
                return Err(SupervisorError::Exhausted {
                    name: request.name.clone(),
                    failures,
                    last,
                });
            }

            let delay = self.policy.delay_for(failures);
            warn!(
                error = %last,
                failures,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Stream disconnected, reconnecting"
            );

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
            self.health.reconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One subscription: returns the error that ended it.
    async fn session<F>(
        &self,
        request: &SubscriptionRequest,
        on_record: &mut F,
        failures: &mut u32,
    ) -> StreamError
    where
        F: FnMut(StreamRecord) + Send,
    {
        let mut records = match self.stream.subscribe(request).await {
            Ok(records) => records,
            Err(e) => return e,
        };

        info!("Stream subscribed");

        while let Some(item) = records.next().await {
            match item {
                Ok(record) => {
                    if !self.health.is_connected() {
                        self.mark(true);
                        *failures = 0;
                    }
                    on_record(record);
                }
                Err(e) => return e,
            }
        }

        StreamError::Closed
    }

    fn mark(&self, connected: bool) {
        if self.health.is_connected() == connected {
            return;
        }
        self.health.set_connected(connected);
        if let Some(hook) = &self.on_connection {
            hook(self.health.name(), connected);
        }
    }
}
