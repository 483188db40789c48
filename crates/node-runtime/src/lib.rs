//! # Node Runtime Library
//!
//! Exposes the node's modules for testing. The entry point is the
//! `main.rs` binary.
//!
//! - `container/` - configuration and component wiring
//! - `genesis/` - contract deployment and initial balances
//! - `adapters/` - the native contract runtime
//! - `workload` - contended transaction batches
//! - `runtime` - the propose, verify and commit round

pub mod adapters;
pub mod container;
pub mod genesis;
pub mod runtime;
pub mod workload;

pub use container::{ConfigError, NodeConfig, NodeContainer, WorkloadConfig};
pub use runtime::{NodeRuntime, RoundReport};
