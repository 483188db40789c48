//! Algorithms module for the Transaction Scheduler
//!
//! Contains:
//! - Kahn's topological sort (replay DAG validation)
//! - Remaining-dependency tracking for replay
//! - Special-vertex append and DAG dump

pub mod dag_ops;
pub mod dag_remain;
pub mod kahns;

pub use dag_ops::{append_special_vertex, dump_dag};
pub use dag_remain::DagRemain;
pub use kahns::validate_dag;
