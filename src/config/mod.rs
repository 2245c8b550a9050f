//! Configuration Module - TOML-based Sniper Configuration
//!
//! Loads and validates configuration from `config.toml` with the
//! signing keypair path overridable from the environment.
//! Program IDs, tip accounts and execution knobs are externalized
//! here - nothing tunable is hardcoded in the usecases layer.

pub mod loader;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::quote::QuoteToken;
use crate::ports::account_stream::Commitment;

/// Environment variable overriding `execution.keypair_path`.
pub const KEYPAIR_PATH_ENV: &str = "SNIPER_KEYPAIR_PATH";

/// Top-level sniper configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the streams are opened.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Process identity and logging.
  pub bot: BotConfig,
  /// Account stream endpoints and commitments.
  pub streams: StreamsConfig,
  /// Stream reconnection policy.
  #[serde(default)]
  pub reconnect: ReconnectConfig,
  /// Ring buffer and polling budget.
  #[serde(default)]
  pub correlation: CorrelationConfig,
  /// Leader schedule gate.
  #[serde(default)]
  pub leader_schedule: LeaderScheduleConfig,
  /// Buy construction and signing.
  pub execution: ExecutionConfig,
  /// Delayed sell after a buy.
  #[serde(default)]
  pub auto_sell: AutoSellConfig,
  /// Block-engine relay.
  #[serde(default)]
  pub relay: RelayConfig,
  /// JSON-RPC endpoint for point reads.
  pub rpc: RpcConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Account stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamsConfig {
  /// JSON-RPC PubSub WebSocket URL.
  pub ws_url: String,
  /// Commitment for the market (reference) stream.
  #[serde(default)]
  pub market_commitment: Commitment,
  /// Commitment for the pool (launch) stream.
  #[serde(default)]
  pub launch_commitment: Commitment,
}

/// Exponential backoff between stream reconnects.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
  /// First retry delay (milliseconds).
  #[serde(default = "default_base_delay")]
  pub base_delay_ms: u64,
  /// Cap on the retry delay (milliseconds).
  #[serde(default = "default_max_delay")]
  pub max_delay_ms: u64,
  /// Consecutive failures before the stream is declared dead (0 = never).
  #[serde(default)]
  pub max_consecutive_failures: u32,
}

/// Correlation budget configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationConfig {
  /// Market payloads kept for lookup.
  #[serde(default = "default_ring_capacity")]
  pub ring_capacity: usize,
  /// Delay before each ring buffer poll (milliseconds).
  #[serde(default = "default_poll_interval")]
  pub poll_interval_ms: u64,
  /// Polls per launch before abandoning.
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
}

/// Leader schedule gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderScheduleConfig {
  /// Gate launches on upcoming cooperating leaders.
  #[serde(default)]
  pub enabled: bool,
  /// Identities of cooperating validators (base58).
  #[serde(default)]
  pub validators: Vec<String>,
  /// Schedule refresh period (seconds).
  #[serde(default = "default_schedule_refresh")]
  pub refresh_secs: u64,
}

/// Buy construction configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
  /// Path to a JSON keypair file (overridden by `SNIPER_KEYPAIR_PATH`).
  #[serde(default)]
  pub keypair_path: Option<String>,
  /// Quote currency spent on each buy.
  #[serde(default = "default_quote_mint")]
  pub quote_mint: QuoteToken,
  /// Quote amount per buy, in human units.
  pub quote_amount: Decimal,
  /// Priority fee (micro-lamports per compute unit).
  #[serde(default = "default_cu_price")]
  pub compute_unit_price_micro_lamports: u64,
  /// Compute unit limit for the buy.
  #[serde(default = "default_buy_cu_limit")]
  pub compute_unit_limit: u32,
  /// Tip paid to the relay per bundle (lamports).
  #[serde(default = "default_tip_lamports")]
  pub tip_lamports: u64,
  /// Skip mints that carry a freeze authority.
  #[serde(default)]
  pub check_freeze_authority: bool,
}

/// Delayed sell configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoSellConfig {
  /// Sell the full position after `delay_ms`.
  #[serde(default)]
  pub enabled: bool,
  /// Delay after a submitted buy (milliseconds).
  #[serde(default = "default_sell_delay")]
  pub delay_ms: u64,
  /// Balance lookups before giving up.
  #[serde(default = "default_max_retry")]
  pub max_retry: u32,
  /// Delay between balance lookups (milliseconds).
  #[serde(default = "default_retry_delay")]
  pub retry_delay_ms: u64,
  /// Slippage tolerance in basis points.
  #[serde(default = "default_slippage_bps")]
  pub slippage_bps: u16,
  /// Compute unit limit for the sell.
  #[serde(default = "default_sell_cu_limit")]
  pub compute_unit_limit: u32,
}

/// Block-engine relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
  /// Block-engine base URL.
  #[serde(default = "default_block_engine_url")]
  pub block_engine_url: String,
  /// Request timeout (milliseconds).
  #[serde(default = "default_relay_timeout")]
  pub timeout_ms: u64,
  /// Local cap on bundle submissions per second (0 = unlimited).
  #[serde(default = "default_max_bundles")]
  pub max_bundles_per_second: u32,
  /// Tip allow-list (base58).
  #[serde(default = "default_tip_accounts")]
  pub tip_accounts: Vec<String>,
  /// Replace the allow-list with the relay's list at startup.
  #[serde(default)]
  pub refresh_tip_accounts: bool,
}

/// JSON-RPC endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
  /// HTTP JSON-RPC URL.
  pub http_url: String,
  /// Request timeout (milliseconds).
  #[serde(default = "default_rpc_timeout")]
  pub timeout_ms: u64,
  /// Latest-blockhash poll period (milliseconds, 0 = stream only).
  #[serde(default = "default_blockhash_poll")]
  pub blockhash_poll_ms: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for ReconnectConfig {
  fn default() -> Self {
    Self {
      base_delay_ms: default_base_delay(),
      max_delay_ms: default_max_delay(),
      max_consecutive_failures: 0,
    }
  }
}

impl Default for CorrelationConfig {
  fn default() -> Self {
    Self {
      ring_capacity: default_ring_capacity(),
      poll_interval_ms: default_poll_interval(),
      max_attempts: default_max_attempts(),
    }
  }
}

impl Default for LeaderScheduleConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      validators: Vec::new(),
      refresh_secs: default_schedule_refresh(),
    }
  }
}

impl Default for AutoSellConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      delay_ms: default_sell_delay(),
      max_retry: default_max_retry(),
      retry_delay_ms: default_retry_delay(),
      slippage_bps: default_slippage_bps(),
      compute_unit_limit: default_sell_cu_limit(),
    }
  }
}

impl Default for RelayConfig {
  fn default() -> Self {
    Self {
      block_engine_url: default_block_engine_url(),
      timeout_ms: default_relay_timeout(),
      max_bundles_per_second: default_max_bundles(),
      tip_accounts: default_tip_accounts(),
      refresh_tip_accounts: false,
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_base_delay() -> u64 {
  500
}

fn default_max_delay() -> u64 {
  10_000
}

fn default_ring_capacity() -> usize {
  crate::domain::ring_buffer::DEFAULT_CAPACITY
}

fn default_poll_interval() -> u64 {
  10
}

fn default_max_attempts() -> u32 {
  2
}

fn default_schedule_refresh() -> u64 {
  60
}

fn default_quote_mint() -> QuoteToken {
  QuoteToken::Wsol
}

fn default_cu_price() -> u64 {
  100_000
}

fn default_buy_cu_limit() -> u32 {
  60_000
}

fn default_tip_lamports() -> u64 {
  150_000
}

fn default_sell_delay() -> u64 {
  10_000
}

fn default_max_retry() -> u32 {
  10
}

fn default_retry_delay() -> u64 {
  2_000
}

fn default_slippage_bps() -> u16 {
  50
}

fn default_sell_cu_limit() -> u32 {
  50_000
}

fn default_block_engine_url() -> String {
  "https://mainnet.block-engine.jito.wtf".to_string()
}

fn default_relay_timeout() -> u64 {
  2_000
}

fn default_max_bundles() -> u32 {
  5
}

fn default_tip_accounts() -> Vec<String> {
  [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
  ]
  .iter()
  .map(|s| (*s).to_string())
  .collect()
}

fn default_rpc_timeout() -> u64 {
  5_000
}

fn default_blockhash_poll() -> u64 {
  2_000
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
