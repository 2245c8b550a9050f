//! Launch Sniper — Entry Point
//!
//! Initializes configuration, logging, relay and RPC clients, and the
//! two supervised account streams. Runs until SIGINT or until a stream
//! exhausts its reconnect budget.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Load the signing keypair (SNIPER_KEYPAIR_PATH or config)
//! 4. Create JitoRelay (BundleRelay port) and RpcChainReader (ChainReader port)
//! 5. Resolve tip accounts, build the ExecutionContext
//! 6. Wire BundleDispatcher (+ optional AutoSeller) and CorrelationEngine
//! 7. Spawn blockhash polling, and leader schedule refresh when the gate is enabled
//! 8. Spawn metrics on :9090 and health on :8080 (/live + /ready)
//! 9. Spawn market and launch stream supervisors
//! 10. Wait for SIGINT or a fatal stream → cancel → drain → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Signer, read_keypair_file};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use launch_sniper::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use launch_sniper::adapters::relay::{JitoClientConfig, JitoRelay};
use launch_sniper::adapters::rpc::RpcChainReader;
use launch_sniper::adapters::stream::supervisor::ConnectionHook;
use launch_sniper::adapters::stream::{PubsubStream, ReconnectPolicy, StreamSupervisor};
use launch_sniper::config::{self, RelayConfig};
use launch_sniper::domain::bundle::TipAccounts;
use launch_sniper::domain::layout::market_offsets;
use launch_sniper::domain::leader_schedule::{AlwaysAttempt, LeaderGate, LeaderScheduleSet, ScheduleGate};
use launch_sniper::domain::ring_buffer::RingBuffer;
use launch_sniper::ports::bundle_relay::BundleRelay;
use launch_sniper::ports::telemetry::Telemetry;
use launch_sniper::usecases::auto_sell::{AutoSeller, SellPolicy};
use launch_sniper::usecases::blockhash::BlockhashPoller;
use launch_sniper::usecases::correlation::{CorrelationEngine, PollBudget};
use launch_sniper::usecases::dispatcher::{BundleDispatcher, ExecutionContext, TippedSubmitter};
use launch_sniper::usecases::leader_refresh::ScheduleRefresher;
use launch_sniper::usecases::subscriber::{LaunchSink, StreamSubscriber, launch_request, market_request};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.bot.log_level)),
        )
        .json()
        .init();
    config::loader::log_summary(&config);

    info!(
        name = %config.bot.name,
        version = env!("CARGO_PKG_VERSION"),
        quote = %config.execution.quote_mint,
        "Starting launch sniper"
    );

    // ── 3. Signing keypair ──────────────────────────────────
    let keypair_path = config.execution.keypair_path.clone().with_context(|| {
        format!("No keypair configured (set execution.keypair_path or {})", config::KEYPAIR_PATH_ENV)
    })?;
    let payer = Arc::new(
        read_keypair_file(&keypair_path)
            .map_err(|e| anyhow!("Failed to read keypair {keypair_path}: {e}"))?,
    );
    info!(payer = %payer.pubkey(), "Keypair loaded");

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let telemetry: Arc<dyn Telemetry> = Arc::clone(&metrics) as Arc<dyn Telemetry>;

    // ── 4. Relay and RPC clients ────────────────────────────
    let relay = Arc::new(
        JitoRelay::new(&JitoClientConfig::from(&config.relay))
            .context("Failed to create block-engine client")?,
    );
    let reader = Arc::new(RpcChainReader::new(&config.rpc).context("Failed to create RPC client")?);

    // ── 5. Execution context ────────────────────────────────
    let tip_accounts = resolve_tip_accounts(&config.relay, relay.as_ref()).await?;
    let context = Arc::new(ExecutionContext::from_config(payer, &config.execution, tip_accounts)?);
    let (blockhash_tx, blockhash_rx) = watch::channel(None);

    // ── 6. Dispatcher and correlation engine ────────────────
    let submitter = Arc::new(TippedSubmitter::new(
        Arc::clone(&relay),
        config.relay.max_bundles_per_second,
    ));
    let mut dispatcher = BundleDispatcher::new(
        Arc::clone(&submitter),
        Arc::clone(&reader),
        Arc::clone(&context),
        blockhash_rx.clone(),
        Arc::clone(&telemetry),
    );
    if config.auto_sell.enabled {
        let seller = AutoSeller::new(
            Arc::clone(&submitter),
            Arc::clone(&reader),
            Arc::clone(&context),
            blockhash_rx,
            SellPolicy::from(&config.auto_sell),
            Arc::clone(&telemetry),
            shutdown.child_token(),
        );
        dispatcher = dispatcher.with_auto_sell(Arc::new(seller));
        info!(delay_ms = config.auto_sell.delay_ms, "Auto-sell enabled");
    }

    let mut background = JoinSet::new();

    if config.rpc.blockhash_poll_ms > 0 {
        let poller = BlockhashPoller::new(
            Arc::clone(&reader),
            blockhash_tx.clone(),
            Duration::from_millis(config.rpc.blockhash_poll_ms),
        );
        let cancel = shutdown.clone();
        background.spawn(async move {
            poller.run(cancel).await;
        });
    }

    // ── 7. Leader gate ──────────────────────────────────────
    let gate: Arc<dyn LeaderGate> = if config.leader_schedule.enabled {
        let schedule = Arc::new(LeaderScheduleSet::new());
        let identities = config
            .leader_schedule
            .validators
            .iter()
            .map(|v| v.parse::<Pubkey>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid validator identity")?;
        let refresher = ScheduleRefresher::new(
            Arc::clone(&reader),
            Arc::clone(&schedule),
            identities,
            Duration::from_secs(config.leader_schedule.refresh_secs),
        );
        let cancel = shutdown.clone();
        background.spawn(async move {
            refresher.run(cancel).await;
        });
        Arc::new(ScheduleGate::new(schedule))
    } else {
        Arc::new(AlwaysAttempt)
    };

    let ring = Arc::new(RingBuffer::with_key_offset(
        config.correlation.ring_capacity,
        market_offsets::BASE_MINT,
    ));
    let engine = Arc::new(CorrelationEngine::new(
        Arc::clone(&ring),
        gate,
        Arc::new(dispatcher),
        PollBudget::from(&config.correlation),
        Arc::clone(&telemetry),
        shutdown.child_token(),
    ));

    // ── 8. Supervisors, metrics and health ──────────────────
    let stream = Arc::new(
        PubsubStream::new(config.streams.ws_url.clone()).with_telemetry(Arc::clone(&telemetry)),
    );
    let policy = ReconnectPolicy::from(&config.reconnect);
    let hook: ConnectionHook = {
        let metrics = Arc::clone(&metrics);
        Arc::new(move |name: &str, connected: bool| metrics.stream_transition(name, connected))
    };
    let market_supervisor = StreamSupervisor::new(Arc::clone(&stream), policy, "markets")
        .with_connection_hook(Arc::clone(&hook));
    let launch_supervisor =
        StreamSupervisor::new(stream, policy, "launches").with_connection_hook(hook);

    let health = Arc::new(HealthState::new(vec![
        market_supervisor.health(),
        launch_supervisor.health(),
    ]));

    if config.metrics.enabled {
        let metrics = Arc::clone(&metrics);
        let bind_address = config.metrics.bind_address.clone();
        let cancel = shutdown.clone();
        background.spawn(async move {
            if let Err(e) = metrics.serve(bind_address, cancel).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    {
        let server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let cancel = shutdown.clone();
        background.spawn(async move {
            if let Err(e) = server.run(cancel).await {
                error!(error = %e, "Health server failed");
            }
        });
    }

    // ── 9. Account streams ──────────────────────────────────
    let quote_mint = config.execution.quote_mint.mint();
    let sink: Arc<dyn LaunchSink> = engine;
    let mut streams = JoinSet::new();

    let market_subscriber = StreamSubscriber::new(
        "markets",
        Arc::clone(&ring),
        Arc::clone(&sink),
        blockhash_tx.clone(),
        Arc::clone(&telemetry),
    );
    let request = market_request(&quote_mint, config.streams.market_commitment);
    let cancel = shutdown.clone();
    streams.spawn(async move {
        market_supervisor
            .run(request, move |record| {
                market_subscriber.handle(record);
            }, cancel)
            .await
    });

    let launch_subscriber = StreamSubscriber::new(
        "launches",
        ring,
        sink,
        blockhash_tx,
        telemetry,
    );
    let request = launch_request(&quote_mint, config.streams.launch_commitment);
    let cancel = shutdown.clone();
    streams.spawn(async move {
        launch_supervisor
            .run(request, move |record| {
                launch_subscriber.handle(record);
            }, cancel)
            .await
    });

    info!("All tasks spawned, sniper is running");

    // ── 10. Wait for SIGINT or a fatal stream ───────────────
    let fatal = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
            None
        }
        Some(joined) = streams.join_next() => match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(anyhow!(e)),
            Err(e) => Some(anyhow!("stream task panicked: {e}")),
        },
    };

    if let Some(e) = &fatal {
        error!(error = %e, "Unrecoverable stream failure, shutting down");
    }

    // Readiness probe → 503 before anything stops
    health.set_pipeline_running(false);
    shutdown.cancel();

    let drain = async {
        while streams.join_next().await.is_some() {}
        while background.join_next().await.is_some() {}
    };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        warn!("Tasks did not stop within 5s, aborting");
    }

    info!("Shutdown complete");
    fatal.map_or(Ok(()), Err)
}

/// Configured tip allow-list, optionally replaced by the relay's list.
async fn resolve_tip_accounts<R: BundleRelay>(config: &RelayConfig, relay: &R) -> Result<TipAccounts> {
    if config.refresh_tip_accounts {
        match relay.tip_accounts().await {
            Ok(fresh) if !fresh.is_empty() => {
                info!(count = fresh.len(), "Tip accounts refreshed from relay");
                return TipAccounts::new(fresh).context("Relay returned no tip accounts");
            }
            Ok(_) => warn!("Relay returned no tip accounts, keeping configured list"),
            Err(e) => warn!(error = %e, "Tip account refresh failed, keeping configured list"),
        }
    }

    let configured = config
        .tip_accounts
        .iter()
        .map(|account| {
            account
                .parse::<Pubkey>()
                .with_context(|| format!("Invalid tip account: {account}"))
        })
        .collect::<Result<Vec<_>>>()?;
    TipAccounts::new(configured).context("No tip accounts configured")
}
