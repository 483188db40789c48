//! # Shared Types Crate
//!
//! Protocol entities and the trait seams shared by the scheduler, the
//! conflict snapshot and the contract runtime.
//!
//! ## Contents
//!
//! - **Entities**: `Transaction`, `TxResult`, `TxRwSet`, `Dag`, `Block`
//! - **Protocol**: limits and well-known state keys (`protocol`)
//! - **Ports**: `BlockchainStore`, `StateIterator`, `Snapshot`,
//!   `TxSimContext`, `VmManager`, `AccessControlProvider`
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   is defined here.
//! - **Canonical Encoding**: RW sets hash over their bincode encoding, so
//!   two nodes that executed the same transaction agree byte for byte.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod protocol;

pub use entities::*;
pub use errors::*;
pub use ports::*;
