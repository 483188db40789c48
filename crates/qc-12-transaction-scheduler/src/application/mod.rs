//! Application layer: the scheduler service and the pieces it drives.

pub mod pool;
pub mod service;
pub mod vm_runner;

pub use pool::WorkerPool;
pub use service::TxScheduler;
pub use vm_runner::{execute, run_vm};
