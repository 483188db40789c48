//! # Node Container
//!
//! Holds the store, the contract runtime and the two schedulers a round
//! needs, wired once at startup.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NodeConfig, WorkloadConfig};
pub use subsystems::NodeContainer;
