//! Error types for the Transaction Scheduler

use thiserror::Error;

/// Errors that abort a whole schedule or replay call.
///
/// Failures of individual transactions never appear here: they settle into
/// the transaction's `TxResult`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The worker pool could not be created
    #[error("Worker pool creation failed: {0}")]
    PoolCreation(String),

    /// Replay did not admit every vertex in time
    #[error("Replay timed out: {admitted} of {total} transactions admitted")]
    ReplayTimeout { admitted: usize, total: usize },

    /// Replay was halted before every vertex was admitted
    #[error("Replay halted: {admitted} of {total} transactions admitted")]
    Halted { admitted: usize, total: usize },

    /// The block's DAG cannot be replayed
    #[error("Invalid DAG: {0}")]
    InvalidDag(#[from] DagError),

    /// A blocking task could not be joined
    #[error("Concurrency failure: {0}")]
    Concurrency(String),
}

/// Structural problems in a received DAG.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("vertex count {vertexes} does not match transaction count {txs}")]
    VertexCountMismatch { vertexes: usize, txs: usize },

    #[error("vertex {vertex} depends on {neighbor}, which is itself or out of range")]
    InvalidNeighbor { vertex: usize, neighbor: u32 },

    #[error("cycle detected among {unresolved} vertexes")]
    CycleDetected { unresolved: usize },
}

/// Why a transaction's parameters were refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("expect parameters length less than {max}, but got {actual}")]
    TooMany { max: usize, actual: usize },

    #[error("expect key length less than {max}, but got {actual}")]
    KeyTooLong { max: usize, actual: usize },

    #[error("expect key no special characters, but got key:[{key}]. letter, number, dot and underline are allowed")]
    IllegalKey { key: String },

    #[error("expect value length less than {max}, but got {actual}")]
    ValueTooLong { max: usize, actual: usize },
}
