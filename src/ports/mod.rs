//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `AccountStream`: Filtered real-time account subscriptions
//! - `BundleRelay`: Atomic bundle submission and tip accounts
//! - `ChainReader`: Point-in-time account and balance reads
//! - `Telemetry`: Counters and latencies reported by the usecases

pub mod account_stream;
pub mod bundle_relay;
pub mod chain_reader;
pub mod telemetry;
