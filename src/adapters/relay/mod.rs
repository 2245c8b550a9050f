//! Bundle Relay Adapters
//!
//! Block-engine clients implementing the `BundleRelay` port.

pub mod jito;

pub use jito::{JitoClientConfig, JitoRelay};
