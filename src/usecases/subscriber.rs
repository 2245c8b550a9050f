//! Stream Subscriber - Record Routing for Both Account Streams
//!
//! Every inbound record is decoded against its fixed layout and routed
//! by kind:
//! 1. Market states go into the ring buffer as raw bytes
//! 2. Pool states become `LaunchEvent`s for the correlation engine
//! 3. Block metadata replaces the latest known blockhash
//!
//! Decode faults drop the single record and are counted. The market
//! and pool streams run one subscriber each; they differ only in the
//! `SubscriptionRequest` they are opened with.

use std::sync::Arc;

use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::launch::LaunchEvent;
use crate::domain::layout::{DecodedAccount, LayoutError, market_offsets, pool_offsets};
use crate::domain::ring_buffer::RingBuffer;
use crate::domain::swap::{OPENBOOK_PROGRAM, RAYDIUM_AMM_V4};
use crate::ports::account_stream::{
  AccountFilter, AccountUpdate, Commitment, MemcmpRule, StreamRecord, SubscriptionRequest,
};
use crate::ports::telemetry::Telemetry;

/// Receiver of decoded launches.
pub trait LaunchSink: Send + Sync + 'static {
  /// Take ownership of a fresh launch. Must not block.
  fn on_launch(&self, event: LaunchEvent);
}

/// What happened to one inbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
  /// Market payload stored under this ring sequence.
  Stored { sequence: u64 },
  /// Pool launch handed to the sink.
  Launched { pool_id: Pubkey },
  /// Latest blockhash replaced.
  Blockhash { slot: u64 },
  /// Payload dropped.
  Dropped(LayoutError),
}

/// Routes stream records into the pipeline.
pub struct StreamSubscriber {
  /// Stream name for logs and metric labels.
  name: String,
  /// Market payload store.
  ring: Arc<RingBuffer>,
  /// Launch consumer.
  launches: Arc<dyn LaunchSink>,
  /// Latest observed blockhash (last write wins).
  blockhash: watch::Sender<Option<Hash>>,
  /// Counters.
  telemetry: Arc<dyn Telemetry>,
}

impl StreamSubscriber {
  /// Create a subscriber sharing the ring, sink and blockhash channel.
  pub fn new(
    name: impl Into<String>,
    ring: Arc<RingBuffer>,
    launches: Arc<dyn LaunchSink>,
    blockhash: watch::Sender<Option<Hash>>,
    telemetry: Arc<dyn Telemetry>,
  ) -> Self {
    Self {
      name: name.into(),
      ring,
      launches,
      blockhash,
      telemetry,
    }
  }

  /// Stream name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Route one record. Never fails; faults are dropped and counted.
  pub fn handle(&self, record: StreamRecord) -> Routed {
    match record {
      StreamRecord::Account(update) => self.route_account(update),
      StreamRecord::BlockMeta { slot, blockhash } => {
        self.blockhash.send_replace(Some(blockhash));
        debug!(stream = %self.name, slot, %blockhash, "Blockhash updated");
        Routed::Blockhash { slot }
      }
    }
  }

  fn route_account(&self, update: AccountUpdate) -> Routed {
    let decoded = match DecodedAccount::decode(&update.data) {
      Ok(decoded) => decoded,
      Err(e) => {
        warn!(stream = %self.name, pubkey = %update.pubkey, error = %e, "Dropping undecodable account");
        self.telemetry.decode_failed(&self.name);
        return Routed::Dropped(e);
      }
    };

    match decoded {
      DecodedAccount::Market(_) => {
        let sequence = self.ring.enqueue(update.data);
        self.telemetry.market_recorded();
        debug!(stream = %self.name, pubkey = %update.pubkey, sequence, "Market stored");
        Routed::Stored { sequence }
      }
      DecodedAccount::Pool(pool) => {
        info!(
          stream = %self.name,
          pool = %update.pubkey,
          base_mint = %pool.base_mint,
          slot = update.slot,
          "New pool launch"
        );
        let pool_id = update.pubkey;
        self.launches.on_launch(LaunchEvent {
          pool_id,
          slot: update.slot,
          pool: *pool,
        });
        Routed::Launched { pool_id }
      }
    }
  }
}

/// Market stream request: OpenBook markets quoted in `quote_mint`.
pub fn market_request(quote_mint: &Pubkey, commitment: Commitment) -> SubscriptionRequest {
  SubscriptionRequest {
    name: "markets".to_string(),
    account_filters: vec![AccountFilter {
      owner: OPENBOOK_PROGRAM,
      memcmp: vec![MemcmpRule::new(market_offsets::QUOTE_MINT, quote_mint.to_bytes())],
    }],
    commitment,
    block_meta: false,
  }
}

/// Pool stream request: fresh AMM v4 pools quoted in `quote_mint` and
/// backed by an OpenBook market, plus block metadata.
pub fn launch_request(quote_mint: &Pubkey, commitment: Commitment) -> SubscriptionRequest {
  SubscriptionRequest {
    name: "launches".to_string(),
    account_filters: vec![AccountFilter {
      owner: RAYDIUM_AMM_V4,
      memcmp: vec![
        MemcmpRule::new(pool_offsets::QUOTE_MINT, quote_mint.to_bytes()),
        MemcmpRule::new(pool_offsets::MARKET_PROGRAM_ID, OPENBOOK_PROGRAM.to_bytes()),
        MemcmpRule::new(pool_offsets::SWAP_QUOTE_IN_AMOUNT, [0u8]),
        MemcmpRule::new(pool_offsets::SWAP_BASE_OUT_AMOUNT, [0u8]),
      ],
    }],
    commitment,
    block_meta: true,
  }
}
