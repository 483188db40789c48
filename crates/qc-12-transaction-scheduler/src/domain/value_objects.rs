//! Value objects for the Transaction Scheduler

use std::collections::HashMap;

use shared_types::{ContractEvent, Parameters, SpecialTxKind, TxResult, TxRwSet, TxStatusCode};

/// One completed nested call, recorded on the execution context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    pub contract_name: String,
    pub method: String,
    pub parameters: Parameters,
    /// Depth at which the call ran (1 for the first nested call)
    pub depth: usize,
    /// Cumulative gas reported once the call returned
    pub gas_used: u64,
    pub status: TxStatusCode,
    pub result: Vec<u8>,
}

/// Why a driver loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// Every transaction was admitted
    Finished,
    /// The wall-clock budget elapsed
    TimedOut,
    /// `halt` was called
    Halted,
}

/// Shape of a validated DAG, from its Kahn levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DagShape {
    /// Number of levels, i.e. the longest dependency chain
    pub depth: usize,
    /// Largest number of vertexes ready at once
    pub max_parallelism: usize,
}

/// What one VM run produced, before admission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub result: TxResult,
    /// Kind reported by the top-level call, promoted by any nested special call
    pub special_kind: SpecialTxKind,
    /// False when the VM reported a non-success status
    pub vm_succeeded: bool,
}

/// Result of a discover-mode run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScheduleOutput {
    /// RW set of every admitted transaction, by tx id
    pub rwsets: HashMap<String, TxRwSet>,
    /// Events emitted by admitted transactions that produced any, by tx id
    pub events: HashMap<String, Vec<ContractEvent>>,
}

/// Result of a replay run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayOutput {
    pub rwsets: HashMap<String, TxRwSet>,
    pub results: HashMap<String, TxResult>,
}
