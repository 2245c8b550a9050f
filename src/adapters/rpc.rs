//! Solana JSON-RPC Reader - Point-in-time Account Queries
//!
//! Implements the `ChainReader` port over plain HTTP JSON-RPC with
//! reqwest: `getAccountInfo`, `getTokenAccountBalance`,
//! `getLatestBlockhash`, `getEpochInfo` and `getLeaderSchedule`. Used off
//! the hot path only.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, instrument};

use crate::config::RpcConfig;
use crate::ports::chain_reader::ChainReader;

/// Message fragment returned for missing token accounts.
const MISSING_ACCOUNT: &str = "could not find account";

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
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

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct LatestBlockhash {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpochInfo {
    absolute_slot: u64,
    slot_index: u64,
}

/// Outcome of a single JSON-RPC call.
enum Reply<T> {
    Value(T),
    Error(RpcErrorBody),
}

/// HTTP JSON-RPC client implementing `ChainReader`.
pub struct RpcChainReader {
    /// Underlying HTTP client.
    http: Client,
    /// RPC endpoint URL.
    url: String,
}

impl RpcChainReader {
    /// Create a reader for the configured endpoint.
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url: config.http_url.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Reply<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let text = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .text()
            .await
            .with_context(|| format!("{method} body unreadable"))?;

        debug!(method, bytes = text.len(), "RPC responded");
        parse_reply(method, &text)
    }

    async fn call_value<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        match self.call(method, params).await? {
            Reply::Value(value) => Ok(value),
            Reply::Error(error) => anyhow::bail!("{method} error {}: {}", error.code, error.message),
        }
    }
}

fn parse_reply<T: DeserializeOwned>(method: &str, text: &str) -> Result<Reply<T>> {
    let response: RpcResponse<T> =
        serde_json::from_str(text).with_context(|| format!("Invalid {method} response"))?;
    match (response.result, response.error) {
        (_, Some(error)) => Ok(Reply::Error(error)),
        (Some(value), None) => Ok(Reply::Value(value)),
        (None, None) => anyhow::bail!("{method} returned neither result nor error"),
    }
}

/// Decode the `[payload, "base64"]` pair of `getAccountInfo`.
fn decode_account(info: Option<AccountInfo>) -> Result<Option<Vec<u8>>> {
    let Some(info) = info else {
        return Ok(None);
    };
    let encoded = info.data.first().context("Account data missing")?;
    let bytes = BASE64.decode(encoded).context("Account data is not base64")?;
    Ok(Some(bytes))
}

fn parse_blockhash(latest: &LatestBlockhash) -> Result<Hash> {
    latest
        .blockhash
        .parse()
        .with_context(|| format!("Invalid blockhash {}", latest.blockhash))
}

/// Map identities' epoch-relative indices to absolute slots.
fn absolute_slots(
    epoch: &EpochInfo,
    schedule: &HashMap<String, Vec<u64>>,
    identities: &[Pubkey],
) -> Vec<u64> {
    let epoch_start = epoch.absolute_slot.saturating_sub(epoch.slot_index);
    let mut slots: Vec<u64> = identities
        .iter()
        .filter_map(|identity| schedule.get(&identity.to_string()))
        .flatten()
        .map(|index| epoch_start + index)
        .collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}

#[async_trait]
impl ChainReader for RpcChainReader {
    #[instrument(skip(self))]
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let info: WithContext<Option<AccountInfo>> = self
            .call_value(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;
        decode_account(info.value)
    }

    #[instrument(skip(self))]
    async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>> {
        let reply: Reply<WithContext<TokenAmount>> = self
            .call(
                "getTokenAccountBalance",
                json!([token_account.to_string(), { "commitment": "confirmed" }]),
            )
            .await?;

        match reply {
            Reply::Value(balance) => {
                let amount = balance
                    .value
                    .amount
                    .parse::<u64>()
                    .context("Token amount is not an integer")?;
                Ok(Some(amount))
            }
            Reply::Error(error) if error.message.contains(MISSING_ACCOUNT) => Ok(None),
            Reply::Error(error) => {
                anyhow::bail!("getTokenAccountBalance error {}: {}", error.code, error.message)
            }
        }
    }

    #[instrument(skip(self))]
    async fn latest_blockhash(&self) -> Result<Hash> {
        let latest: WithContext<LatestBlockhash> = self
            .call_value("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await?;
        parse_blockhash(&latest.value)
    }

    #[instrument(skip_all, fields(identities = identities.len()))]
    async fn leader_slots(&self, identities: &[Pubkey]) -> Result<Vec<u64>> {
        let epoch: EpochInfo = self.call_value("getEpochInfo", json!([])).await?;
        let schedule: HashMap<String, Vec<u64>> =
            self.call_value("getLeaderSchedule", json!([])).await?;
        Ok(absolute_slots(&epoch, &schedule, identities))
    }
}
