//! Solana PubSub WebSocket Stream - Filtered Program Account Feed
//!
//! Opens one WebSocket per `SubscriptionRequest`, sends a
//! `programSubscribe` per account filter (plus `blockSubscribe` when block
//! metadata is requested) and turns notifications into `StreamRecord`s.
//! Implements the `AccountStream` port so usecases never see JSON.
//!
//! A notification that fails to decode is counted and dropped; the
//! session carries on. `blockSubscribe` is disabled on most public
//! endpoints, so a refusal of that one subscription only turns block
//! metadata off for the session. Reconnection is not handled here: a
//! closed socket, a transport error or a refused account subscription
//! ends the returned stream and the `StreamSupervisor` decides what
//! happens next.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::stream;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, instrument, warn};

use crate::ports::account_stream::{
    AccountFilter, AccountStream, AccountUpdate, Commitment, RecordStream, StreamError,
    StreamRecord, SubscriptionRequest,
};
use crate::ports::telemetry::{NoopTelemetry, Telemetry};

/// JSON-RPC envelope shared by responses and notifications.
#[derive(Debug, Deserialize)]
struct WsEnvelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<NotificationParams>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// `programNotification` payload.
#[derive(Debug, Deserialize)]
struct ProgramNotification {
    context: SlotContext,
    value: KeyedAccount,
}

#[derive(Debug, Deserialize)]
struct SlotContext {
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: UiAccount,
}

#[derive(Debug, Deserialize)]
struct UiAccount {
    /// `[payload, encoding]`.
    data: Vec<String>,
    owner: String,
}

/// `blockNotification` payload.
#[derive(Debug, Deserialize)]
struct BlockNotification {
    value: BlockValue,
}

#[derive(Debug, Deserialize)]
struct BlockValue {
    slot: u64,
    #[serde(default)]
    block: Option<BlockBody>,
}

#[derive(Debug, Deserialize)]
struct BlockBody {
    blockhash: String,
}

/// What one text frame means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Deliver this record.
    Record(StreamRecord),
    /// Acks, filtered-out accounts and unrelated methods.
    Skip,
    /// This notification could not be decoded; later ones still can.
    Fault(String),
    /// The server refused `blockSubscribe`; account notifications go on.
    BlockMetaRefused(String),
}

/// Live session state carried through the record stream.
struct Session<R, W> {
    /// Stream name for logs and metrics.
    name: String,
    /// Read half of the socket.
    read: R,
    /// Write half, held so the socket stays open.
    _write: W,
    /// Filters re-checked locally on every account notification.
    filters: Vec<AccountFilter>,
    /// Request id of the `blockSubscribe` call, if one was sent.
    block_request_id: Option<u64>,
    /// Decode fault counter.
    telemetry: Arc<dyn Telemetry>,
}

/// Solana JSON-RPC PubSub adapter.
///
/// Implements the `AccountStream` port. Each `subscribe` call owns its
/// own WebSocket connection.
pub struct PubsubStream {
    /// WebSocket URL from config.
    ws_url: String,
    /// Decode fault counter.
    telemetry: Arc<dyn Telemetry>,
}

impl PubsubStream {
    /// Create a new PubSub stream for the given endpoint.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Count dropped notifications through `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

#[async_trait]
impl AccountStream for PubsubStream {
    #[instrument(skip(self, request), fields(stream = %request.name))]
    async fn subscribe(&self, request: &SubscriptionRequest) -> Result<RecordStream, StreamError> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let (mut write, read) = ws_stream.split();

        let mut request_id = 1u64;
        for filter in &request.account_filters {
            let body = program_subscribe_request(request_id, filter, request.commitment);
            write
                .send(Message::Text(body.to_string()))
                .await
                .map_err(|e| StreamError::Connect(e.to_string()))?;
            request_id += 1;
        }

        let mut block_request_id = None;
        if request.block_meta {
            let body = block_subscribe_request(request_id);
            write
                .send(Message::Text(body.to_string()))
                .await
                .map_err(|e| StreamError::Connect(e.to_string()))?;
            block_request_id = Some(request_id);
        }

        info!(
            filters = request.account_filters.len(),
            block_meta = request.block_meta,
            commitment = request.commitment.as_str(),
            "PubSub subscriptions sent"
        );

        let session = Session {
            name: request.name.clone(),
            read,
            _write: write,
            filters: request.account_filters.clone(),
            block_request_id,
            telemetry: Arc::clone(&self.telemetry),
        };

        Ok(stream::unfold(Some(session), next_record).boxed())
    }
}

/// Pull frames until one yields a record; end the stream after a fatal error.
async fn next_record<R, W>(
    session: Option<Session<R, W>>,
) -> Option<(Result<StreamRecord, StreamError>, Option<Session<R, W>>)>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut session = session?;

    loop {
        let frame = match session.read.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Some((Err(StreamError::Protocol(e.to_string())), None)),
            None => return Some((Err(StreamError::Closed), None)),
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(frame) => {
                debug!(stream = %session.name, ?frame, "PubSub close frame received");
                return Some((Err(StreamError::Closed), None));
            }
            _ => continue,
        };

        match parse_message(&text, &session.filters, session.block_request_id) {
            Ok(Frame::Record(record)) => return Some((Ok(record), Some(session))),
            Ok(Frame::Skip) => {}
            Ok(Frame::Fault(reason)) => {
                warn!(stream = %session.name, %reason, "Dropping undecodable notification");
                session.telemetry.decode_failed(&session.name);
            }
            Ok(Frame::BlockMetaRefused(reason)) => {
                warn!(
                    stream = %session.name,
                    %reason,
                    "blockSubscribe refused, continuing without block metadata"
                );
                session.block_request_id = None;
            }
            Err(e) => {
                warn!(stream = %session.name, error = %e, "Dropping PubSub stream");
                return Some((Err(e), None));
            }
        }
    }
}

/// Build a `programSubscribe` request for one filter.
pub fn program_subscribe_request(id: u64, filter: &AccountFilter, commitment: Commitment) -> Value {
    let filters: Vec<Value> = filter
        .memcmp
        .iter()
        .map(|rule| {
            json!({
                "memcmp": {
                    "offset": rule.offset,
                    "bytes": BASE64.encode(&rule.bytes),
                    "encoding": "base64",
                }
            })
        })
        .collect();

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "programSubscribe",
        "params": [
            filter.owner.to_string(),
            {
                "encoding": "base64",
                "commitment": commitment.as_str(),
                "filters": filters,
            }
        ]
    })
}

/// Build a `blockSubscribe` request for blockhash tracking.
///
/// Block notifications require at least `confirmed` commitment.
pub fn block_subscribe_request(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "blockSubscribe",
        "params": [
            "all",
            {
                "commitment": Commitment::Confirmed.as_str(),
                "transactionDetails": "none",
                "showRewards": false,
            }
        ]
    })
}

/// Interpret one text frame.
///
/// Subscription confirmations, notifications for unrelated methods and
/// account notifications that fail the local filter check are `Skip`.
/// Undecodable payloads are `Fault`. An error reply to the request
/// numbered `block_request_id` is `BlockMetaRefused`.
///
/// # Errors
/// Returns `StreamError::Protocol` for any other JSON-RPC error reply,
/// which means an account subscription was refused.
pub fn parse_message(
    text: &str,
    filters: &[AccountFilter],
    block_request_id: Option<u64>,
) -> Result<Frame, StreamError> {
    let envelope: WsEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => return Ok(Frame::Fault(format!("invalid JSON: {e}"))),
    };

    if let Some(error) = envelope.error {
        let reason = format!("rpc error {}: {}", error.code, error.message);
        if envelope.id.is_some() && envelope.id == block_request_id {
            return Ok(Frame::BlockMetaRefused(reason));
        }
        return Err(StreamError::Protocol(reason));
    }

    let (Some(method), Some(params)) = (envelope.method, envelope.params) else {
        return Ok(Frame::Skip);
    };

    let decoded = match method.as_str() {
        "programNotification" => program_frame(params.result, filters),
        "blockNotification" => block_frame(params.result),
        _ => Ok(Frame::Skip),
    };
    Ok(decoded.unwrap_or_else(Frame::Fault))
}

fn program_frame(result: Value, filters: &[AccountFilter]) -> Result<Frame, String> {
    let note: ProgramNotification =
        serde_json::from_value(result).map_err(|e| format!("programNotification: {e}"))?;
    let update = account_update(note)?;
    let wanted = filters.is_empty()
        || filters
            .iter()
            .any(|filter| filter.matches(&update.owner, &update.data));
    Ok(if wanted {
        Frame::Record(StreamRecord::Account(update))
    } else {
        Frame::Skip
    })
}

fn block_frame(result: Value) -> Result<Frame, String> {
    let note: BlockNotification =
        serde_json::from_value(result).map_err(|e| format!("blockNotification: {e}"))?;
    let Some(block) = note.value.block else {
        return Ok(Frame::Skip);
    };
    let blockhash = block
        .blockhash
        .parse::<Hash>()
        .map_err(|e| format!("blockhash: {e}"))?;
    Ok(Frame::Record(StreamRecord::BlockMeta {
        slot: note.value.slot,
        blockhash,
    }))
}

fn account_update(note: ProgramNotification) -> Result<AccountUpdate, String> {
    let pubkey = parse_pubkey(&note.value.pubkey)?;
    let owner = parse_pubkey(&note.value.account.owner)?;
    let encoded = note
        .value
        .account
        .data
        .first()
        .ok_or_else(|| "account data missing".to_string())?;
    let data = BASE64
        .decode(encoded)
        .map_err(|e| format!("account data: {e}"))?;

    Ok(AccountUpdate {
        slot: note.context.slot,
        pubkey,
        owner,
        data,
    })
}

fn parse_pubkey(value: &str) -> Result<Pubkey, String> {
    value.parse().map_err(|e| format!("pubkey {value}: {e}"))
}
