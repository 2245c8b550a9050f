//! Jito Block Engine Client - JSON-RPC Bundle Submission
//!
//! Wraps reqwest for the block engine's `/api/v1/bundles` endpoint:
//! `sendBundle` with base64-encoded transactions and `getTipAccounts`.
//! Implements the `BundleRelay` port.
//!
//! Submission is never retried here. A bundle built against a stale
//! blockhash is worthless, so the caller decides what a failure means.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, instrument, warn};

use crate::config::RelayConfig;
use crate::domain::bundle::encode_transactions;
use crate::ports::bundle_relay::{BundleRelay, RelayError, RelayResponse};

const BUNDLES_PATH: &str = "/api/v1/bundles";

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
  #[serde(default)]
  result: Option<T>,
  #[serde(default)]
  error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
  #[serde(default)]
  code: i64,
  #[serde(default)]
  message: String,
}

/// Configuration for the block engine client.
#[derive(Debug, Clone)]
pub struct JitoClientConfig {
  /// Block engine base URL.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
}

impl From<&RelayConfig> for JitoClientConfig {
  fn from(config: &RelayConfig) -> Self {
    Self {
      base_url: config.block_engine_url.trim_end_matches('/').to_string(),
      timeout: Duration::from_millis(config.timeout_ms),
    }
  }
}

/// HTTP client for a Jito block engine.
pub struct JitoRelay {
  /// Underlying HTTP client.
  http: Client,
  /// Full bundles endpoint URL.
  endpoint: String,
}

impl JitoRelay {
  /// Create a new block engine client.
  pub fn new(config: &JitoClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(2)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self {
      http,
      endpoint: format!("{}{}", config.base_url, BUNDLES_PATH),
    })
  }

  /// POST one JSON-RPC call and return the status and raw body.
  async fn call(&self, method: &str, params: Value) -> Result<(StatusCode, String), RelayError> {
    let body = json!({
      "jsonrpc": "2.0",
      "id": 1,
      "method": method,
      "params": params,
    });

    let response = self
      .http
      .post(&self.endpoint)
      .json(&body)
      .send()
      .await
      .map_err(|e| RelayError::Transport(e.to_string()))?;

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| RelayError::Transport(e.to_string()))?;

    debug!(method, status = %status, "Block engine responded");
    Ok((status, text))
  }
}

#[async_trait]
impl BundleRelay for JitoRelay {
  #[instrument(skip_all, fields(txs = transactions.len()))]
  async fn send_bundle(&self, transactions: &[VersionedTransaction]) -> Result<RelayResponse, RelayError> {
    let encoded = encode_transactions(transactions).map_err(|e| RelayError::Encode(e.to_string()))?;
    let (status, text) = self
      .call("sendBundle", json!([encoded, { "encoding": "base64" }]))
      .await?;

    if status.is_server_error() {
      warn!(status = %status, "Block engine server error");
      return Err(RelayError::Transport(format!("server error {status}: {text}")));
    }

    parse_send_bundle(status, &text)
  }

  async fn tip_accounts(&self) -> Result<Vec<Pubkey>, RelayError> {
    let (status, text) = self.call("getTipAccounts", json!([])).await?;
    if !status.is_success() {
      return Err(RelayError::Transport(format!("getTipAccounts {status}: {text}")));
    }
    parse_tip_accounts(&text)
  }
}

/// Interpret a `sendBundle` response body.
///
/// # Errors
/// Returns `RelayError::Protocol` if the body carries neither a result
/// nor an error.
pub fn parse_send_bundle(status: StatusCode, text: &str) -> Result<RelayResponse, RelayError> {
  if status == StatusCode::TOO_MANY_REQUESTS {
    return Ok(RelayResponse::Rejected {
      reason: format!("rate limited by block engine: {text}"),
      tx_index: None,
    });
  }

  let response: RpcResponse<String> =
    serde_json::from_str(text).map_err(|e| RelayError::Protocol(format!("{status}: {e}: {text}")))?;

  match (response.result, response.error) {
    (_, Some(error)) => Ok(RelayResponse::Rejected {
      tx_index: offending_index(&error.message),
      reason: format!("{} ({})", error.message, error.code),
    }),
    (Some(bundle_id), None) => Ok(RelayResponse::Accepted { bundle_id }),
    (None, None) => Err(RelayError::Protocol(format!("empty response: {text}"))),
  }
}

/// Interpret a `getTipAccounts` response body.
///
/// # Errors
/// Returns `RelayError::Protocol` on malformed JSON or addresses.
pub fn parse_tip_accounts(text: &str) -> Result<Vec<Pubkey>, RelayError> {
  let response: RpcResponse<Vec<String>> =
    serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))?;

  if let Some(error) = response.error {
    return Err(RelayError::Protocol(format!("{} ({})", error.message, error.code)));
  }

  response
    .result
    .unwrap_or_default()
    .iter()
    .map(|account| {
      account
        .parse()
        .map_err(|e| RelayError::Protocol(format!("tip account {account}: {e}")))
    })
    .collect()
}

/// Pull a transaction index out of messages like "transaction 1 failed".
fn offending_index(message: &str) -> Option<usize> {
  let lower = message.to_ascii_lowercase();
  let mut words = lower.split(|c: char| !c.is_ascii_alphanumeric());
  while let Some(word) = words.next() {
    if word == "transaction" || word == "tx" {
      if let Some(index) = words.next().and_then(|next| next.parse().ok()) {
        return Some(index);
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_accepted_bundle() {
    let text = r#"{"jsonrpc":"2.0","result":"2id3YC2jK9G5Wo2phDx4gJVAew8DcY5NAojnVuao8rkxwPYPe8cSwE5GzhEgJA2y8fVjDEo6iR6ykBvDxrTQrtpb","id":1}"#;
    let response = parse_send_bundle(StatusCode::OK, text).unwrap();
    assert!(matches!(response, RelayResponse::Accepted { bundle_id } if bundle_id.starts_with("2id3")));
  }

  #[test]
  fn test_rejected_bundle_keeps_reason() {
    let text = r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"bundle contains an expired blockhash"},"id":1}"#;
    let response = parse_send_bundle(StatusCode::BAD_REQUEST, text).unwrap();
    match response {
      RelayResponse::Rejected { reason, tx_index } => {
        assert!(reason.contains("expired blockhash"));
        assert_eq!(tx_index, None);
      }
      other => panic!("expected rejection, got {other:?}"),
    }
  }

  #[test]
  fn test_rejection_names_offending_transaction() {
    let text = r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"transaction 1 failed simulation"},"id":1}"#;
    let response = parse_send_bundle(StatusCode::BAD_REQUEST, text).unwrap();
    assert!(matches!(response, RelayResponse::Rejected { tx_index: Some(1), .. }));
  }

  #[test]
  fn test_rate_limit_is_rejection() {
    let response = parse_send_bundle(StatusCode::TOO_MANY_REQUESTS, "congested").unwrap();
    assert!(matches!(response, RelayResponse::Rejected { .. }));
  }

  #[test]
  fn test_garbage_is_protocol_error() {
    assert!(matches!(
      parse_send_bundle(StatusCode::OK, "<html>"),
      Err(RelayError::Protocol(_))
    ));
  }

  #[test]
  fn test_tip_accounts_parse() {
    let text = r#"{"jsonrpc":"2.0","result":["96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5","HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"],"id":1}"#;
    let accounts = parse_tip_accounts(text).unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].to_string(), "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5");
  }

  #[test]
  fn test_endpoint_strips_trailing_slash() {
    let config = RelayConfig {
      block_engine_url: "https://example.invalid/".to_string(),
      ..RelayConfig::default()
    };
    let relay = JitoRelay::new(&JitoClientConfig::from(&config)).unwrap();
    assert_eq!(relay.endpoint, "https://example.invalid/api/v1/bundles");
  }
}
