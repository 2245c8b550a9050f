//! Account Stream Adapters
//!
//! Solana PubSub transport and the reconnecting supervisor that owns
//! each long-lived subscription.

pub mod pubsub;
pub mod supervisor;

pub use pubsub::PubsubStream;
pub use supervisor::{ReconnectPolicy, StreamHealth, StreamSupervisor, SupervisorError};
