//! # QC-12: Transaction Scheduler Subsystem
//!
//! Optimistic parallel execution of a block's transactions.
//!
//! ## Modes
//!
//! - **Discover** (`schedule`): executes a batch concurrently, admits each
//!   execution through the conflict snapshot, and derives the block's DAG
//!   from the admission order.
//! - **Replay** (`simulate_with_dag`): re-executes a received block, never
//!   starting a transaction before its DAG predecessors are admitted.
//!
//! ## Architecture
//!
//! - **Domain**: errors, value objects, parameter invariants
//! - **Algorithms**: Kahn's validation, replay bookkeeping, DAG helpers
//! - **Adapters**: `TxSimContextImpl` and the merge iterators
//! - **Application**: `TxScheduler`, worker pool, VM invocation
//! - **Ports**: `TransactionSchedulerApi`

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::{MergeIterator, TxSimContextImpl, WsetIterator};
pub use application::{TxScheduler, WorkerPool};
pub use config::SchedulerConfig;
pub use domain::errors::{DagError, ParameterError, SchedulerError};
pub use domain::value_objects::*;
pub use ports::inbound::TransactionSchedulerApi;
