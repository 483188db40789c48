//! # Adapters
//!
//! Implementations of the scheduler's outbound ports for this node.

pub mod kv_vm;

pub use kv_vm::{account_key, KvVm, ACCOUNT_PREFIX, BANK_CONTRACT, CONFIG_CONTRACT, KV_CONTRACT};
