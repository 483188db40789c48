//! # qc-04-state-management
//!
//! Per-block conflict snapshot for the optimistic transaction scheduler.
//!
//! ## Role in System
//!
//! - **Single Synchronization Point**: every execution attempt is admitted
//!   or rejected by one atomic check-and-commit in `SnapshotImpl`.
//! - **DAG Source**: the admission order, once sealed, is turned into the
//!   dependency DAG carried in the block.
//! - **State Reads**: reads fall through admitted writes, then the parent
//!   block's snapshot, then the `BlockchainStore`.
//!
//! ```text
//!  worker ──apply_execution_result──→ [SnapshotImpl] ──read_object──→ [BlockchainStore]
//!                                          │
//!                            seal + build_dag
//!                                          ↓
//!                                   Dag (block.dag)
//! ```

pub mod adapters;
pub mod domain;

pub use adapters::*;
pub use domain::*;
