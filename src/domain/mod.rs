//! Domain layer - Core sniper logic and models.
//!
//! Pure data structures and algorithms: the market ring buffer, fixed
//! account layouts, swap construction, the leader gate and the bundle
//! model. Nothing here performs I/O.

pub mod bundle;
pub mod launch;
pub mod layout;
pub mod leader_schedule;
pub mod quote;
pub mod ring_buffer;
pub mod swap;

// Re-export core types for convenience
pub use bundle::{Bundle, DispatchError, DispatchOutcome, TipAccounts};
pub use launch::{AbandonReason, CorrelationOutcome, LaunchEvent, MatchedLaunch};
pub use layout::{DecodedAccount, LayoutError, LiquidityStateV4, MarketKeys, MarketStateV3};
pub use leader_schedule::{AlwaysAttempt, LeaderGate, LeaderScheduleSet, ScheduleGate};
pub use quote::QuoteToken;
pub use ring_buffer::{RawRecord, RingBuffer};
pub use swap::PoolKeys;
