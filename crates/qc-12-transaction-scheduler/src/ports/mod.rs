//! Ports (Hexagonal Architecture)
//!
//! Inbound: `TransactionSchedulerApi`. Outbound ports (`Snapshot`,
//! `VmManager`, `BlockchainStore`) live in `shared-types`.

pub mod inbound;

pub use inbound::TransactionSchedulerApi;
