//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (WebSockets, HTTP JSON-RPC, block engine).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `stream`: Solana PubSub account streams and their supervisor
//! - `relay`: Jito block-engine bundle submission
//! - `rpc`: Solana JSON-RPC point reads
//! - `metrics`: Prometheus metrics export and health checks

pub mod metrics;
pub mod relay;
pub mod rpc;
pub mod stream;
