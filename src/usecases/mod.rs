//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the sniper's workflows. Each use case is a self-contained
//! business operation.
//!
//! Use cases:
//! - `StreamSubscriber`: Routes stream records into the pipeline
//! - `CorrelationEngine`: Matches launches with buffered markets
//! - `BundleDispatcher`: Builds, tips and submits the buy bundle
//! - `AutoSeller`: Optional delayed exit after a submitted buy
//! - `ScheduleRefresher`: Keeps the leader gate's slot set current
//! - `BlockhashPoller`: RPC fallback for the latest blockhash

pub mod auto_sell;
pub mod blockhash;
pub mod correlation;
pub mod dispatcher;
pub mod leader_refresh;
pub mod subscriber;
