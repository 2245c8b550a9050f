//! Launch Events and Correlation Outcomes
//!
//! A `LaunchEvent` is created when the pool stream delivers a fresh AMM v4
//! pool. It lives for one correlation resolution and is then dropped.

use solana_sdk::pubkey::Pubkey;

use super::layout::{LayoutError, LiquidityStateV4, MarketKeys};

/// Width of the correlation key (a mint address).
pub const KEY_LEN: usize = 32;

/// Decoded pool-creation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEvent {
    /// Pool state account address.
    pub pool_id: Pubkey,
    /// Slot the record was produced in.
    pub slot: u64,
    /// Decoded pool state.
    pub pool: LiquidityStateV4,
}

impl LaunchEvent {
    /// Bytes searched for in the market ring buffer (the base mint).
    pub fn correlation_key(&self) -> [u8; KEY_LEN] {
        self.pool.base_mint.to_bytes()
    }
}

/// A launch joined with the market subset it needs for a swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedLaunch {
    pub launch: LaunchEvent,
    pub market: MarketKeys,
}

/// Why a launch was abandoned without dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// Leader gate said no producer is coming up.
    GateClosed,
    /// Every poll missed the ring buffer.
    Exhausted { attempts: u32 },
    /// Shutdown interrupted the attempt.
    Cancelled,
    /// A matching market payload failed to decode.
    MarketDecode(LayoutError),
}

impl AbandonReason {
    /// Metric label for this reason.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GateClosed => "gate_closed",
            Self::Exhausted { .. } => "exhausted",
            Self::Cancelled => "cancelled",
            Self::MarketDecode(_) => "market_decode",
        }
    }
}

/// Terminal state of a correlation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    Matched(Box<MatchedLaunch>),
    Abandoned(AbandonReason),
}

impl CorrelationOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Matched(_) => "matched",
            Self::Abandoned(reason) => reason.label(),
        }
    }
}
