//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters, and providing clear error messages for
//! misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use super::{AppConfig, KEYPAIR_PATH_ENV};

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config = parse_config(&content)?;
  apply_env_overrides(&mut config, std::env::var(KEYPAIR_PATH_ENV).ok());
  validate_config(&config)?;

  Ok(config)
}

/// Log the effective configuration.
///
/// Called by `main` once the subscriber is installed; `load_config` runs
/// before logging exists.
pub fn log_summary(config: &AppConfig) {
  info!(
    name = %config.bot.name,
    quote = %config.execution.quote_mint,
    amount = %config.execution.quote_amount,
    ring_capacity = config.correlation.ring_capacity,
    poll_interval_ms = config.correlation.poll_interval_ms,
    max_attempts = config.correlation.max_attempts,
    leader_gate = config.leader_schedule.enabled,
    auto_sell = config.auto_sell.enabled,
    blockhash_poll_ms = config.rpc.blockhash_poll_ms,
    "Configuration loaded successfully"
  );
}

/// Parse configuration text without touching the filesystem.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  toml::from_str(content).with_context(|| "Failed to parse config.toml")
}

/// Environment values take precedence over the file.
fn apply_env_overrides(config: &mut AppConfig, keypair_path: Option<String>) {
  if let Some(path) = keypair_path.filter(|p| !p.is_empty()) {
    config.execution.keypair_path = Some(path);
  }
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty endpoints
/// - A usable correlation budget
/// - A positive quote amount that fits the quote token's decimals
/// - Parseable tip accounts
pub fn validate_config(config: &AppConfig) -> Result<()> {
  // Endpoint validation
  anyhow::ensure!(
    !config.streams.ws_url.is_empty(),
    "Stream WebSocket URL must not be empty"
  );
  anyhow::ensure!(
    !config.rpc.http_url.is_empty(),
    "RPC HTTP URL must not be empty"
  );
  anyhow::ensure!(
    !config.relay.block_engine_url.is_empty(),
    "Block engine URL must not be empty"
  );

  // Correlation validation
  anyhow::ensure!(
    config.correlation.ring_capacity > 0,
    "ring_capacity must be positive"
  );
  anyhow::ensure!(
    config.correlation.max_attempts > 0,
    "max_attempts must be positive"
  );

  // Reconnect validation
  anyhow::ensure!(
    config.reconnect.base_delay_ms > 0
      && config.reconnect.base_delay_ms <= config.reconnect.max_delay_ms,
    "reconnect delays must satisfy 0 < base_delay_ms <= max_delay_ms, got {} / {}",
    config.reconnect.base_delay_ms,
    config.reconnect.max_delay_ms
  );

  // Execution validation
  anyhow::ensure!(
    config.execution.quote_amount.is_sign_positive() && !config.execution.quote_amount.is_zero(),
    "quote_amount must be positive, got {}",
    config.execution.quote_amount
  );
  anyhow::ensure!(
    config
      .execution
      .quote_mint
      .to_raw(config.execution.quote_amount)
      .is_some_and(|raw| raw > 0),
    "quote_amount {} does not fit {} ({} decimals)",
    config.execution.quote_amount,
    config.execution.quote_mint,
    config.execution.quote_mint.decimals()
  );
  anyhow::ensure!(
    config.execution.compute_unit_limit > 0,
    "compute_unit_limit must be positive"
  );

  // Leader schedule validation
  if config.leader_schedule.enabled {
    anyhow::ensure!(
      !config.leader_schedule.validators.is_empty(),
      "leader_schedule enabled without validators"
    );
    anyhow::ensure!(
      config.leader_schedule.refresh_secs > 0,
      "leader_schedule refresh_secs must be positive"
    );
    for identity in &config.leader_schedule.validators {
      identity
        .parse::<Pubkey>()
        .with_context(|| format!("Invalid validator identity: {identity}"))?;
    }
  }

  // Auto-sell validation
  if config.auto_sell.enabled {
    anyhow::ensure!(
      config.auto_sell.slippage_bps < 10_000,
      "auto_sell slippage_bps must be below 10000, got {}",
      config.auto_sell.slippage_bps
    );
    anyhow::ensure!(
      config.auto_sell.max_retry > 0,
      "auto_sell max_retry must be positive"
    );
  }

  // Relay validation
  anyhow::ensure!(
    !config.relay.tip_accounts.is_empty(),
    "At least one tip account must be configured"
  );
  for account in &config.relay.tip_accounts {
    account
      .parse::<Pubkey>()
      .with_context(|| format!("Invalid tip account: {account}"))?;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use parking_lot::Mutex;
  use rust_decimal_macros::dec;

  use super::*;
  use crate::domain::quote::QuoteToken;
  use crate::ports::account_stream::Commitment;

  const MINIMAL: &str = r#"
[bot]
name = "sniper-test"

[streams]
ws_url = "wss://example.invalid"

[execution]
quote_amount = "0.01"

[rpc]
http_url = "https://example.invalid"
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    validate_config(&config).unwrap();

    assert_eq!(config.correlation.ring_capacity, 5000);
    assert_eq!(config.correlation.poll_interval_ms, 10);
    assert_eq!(config.correlation.max_attempts, 2);
    assert_eq!(config.execution.quote_mint, QuoteToken::Wsol);
    assert_eq!(config.execution.quote_amount, dec!(0.01));
    assert_eq!(config.streams.launch_commitment, Commitment::Processed);
    assert_eq!(config.relay.tip_accounts.len(), 8);
    assert!(!config.leader_schedule.enabled);
    assert!(!config.auto_sell.enabled);
  }

  #[test]
  fn test_env_override_wins() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.execution.keypair_path = Some("file.json".to_string());

    apply_env_overrides(&mut config, Some("env.json".to_string()));
    assert_eq!(config.execution.keypair_path.as_deref(), Some("env.json"));

    apply_env_overrides(&mut config, Some(String::new()));
    assert_eq!(config.execution.keypair_path.as_deref(), Some("env.json"));
  }

  #[test]
  fn test_rejects_zero_attempts() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.correlation.max_attempts = 0;
    assert!(validate_config(&config).is_err());
  }

  #[test]
  fn test_rejects_dust_quote_amount() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.execution.quote_mint = QuoteToken::Usdc;
    config.execution.quote_amount = dec!(0.0000001);
    assert!(validate_config(&config).is_err());
  }

  #[test]
  fn test_rejects_bad_tip_account() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.relay.tip_accounts = vec!["not-a-key".to_string()];
    assert!(validate_config(&config).is_err());
  }

  #[test]
  fn test_leader_gate_needs_validators() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.leader_schedule.enabled = true;
    assert!(validate_config(&config).is_err());

    config.leader_schedule.validators = vec![Pubkey::new_unique().to_string()];
    assert!(validate_config(&config).is_ok());
  }

  #[derive(Clone, Default)]
  struct Captured(Arc<Mutex<Vec<u8>>>);

  impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn test_summary_logged_by_caller_not_loader() {
    let path = std::env::temp_dir().join(format!("sniper-config-{}.toml", std::process::id()));
    std::fs::write(&path, MINIMAL).unwrap();

    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_writer(move || writer.clone())
      .with_ansi(false)
      .finish();

    tracing::subscriber::with_default(subscriber, || {
      let config = load_config(path.to_str().unwrap()).unwrap();
      assert!(captured.0.lock().is_empty());

      log_summary(&config);
    });
    std::fs::remove_file(&path).ok();

    let output = String::from_utf8(captured.0.lock().clone()).unwrap();
    assert!(output.contains("Configuration loaded successfully"));
    assert!(output.contains("blockhash_poll_ms=2000"));
  }

  #[test]
  fn test_unknown_quote_mint_fails_to_parse() {
    let content = MINIMAL.replace("quote_amount", "quote_mint = \"BONK\"\nquote_amount");
    assert!(parse_config(&content).is_err());
  }
}
