//! # Ports
//!
//! Trait seams between the scheduler and its collaborators.
//!
//! | Trait | Implemented by | Consumed by |
//! |-------|----------------|-------------|
//! | `BlockchainStore` | storage layer | snapshot, execution context |
//! | `StateIterator` | storage layer, merge iterator | contracts |
//! | `Snapshot` | conflict snapshot | scheduler, execution context |
//! | `TxSimContext` | execution context | contract VM |
//! | `VmManager` | contract VM | scheduler, execution context |
//! | `AccessControlProvider` | policy engine | contract VM |
//!
//! All of these are synchronous: the scheduler runs them on blocking
//! worker threads.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{
    Contract, ContractResult, Dag, KvEntry, Parameters, SpecialTxKind, SqlType, Transaction,
    TxResult, TxRwSet, TxStatusCode, TxType,
};
use crate::errors::{AccessControlError, StoreError};

/// A forward-only range scan.
pub trait StateIterator: Send {
    /// Yield the next entry in key order, or `None` once exhausted.
    fn next_entry(&mut self) -> Result<Option<KvEntry>, StoreError>;

    /// Release underlying resources. Further calls yield nothing.
    fn release(&mut self) {}

    /// Drain everything that is left.
    fn collect_remaining(&mut self) -> Result<Vec<KvEntry>, StoreError> {
        let mut out = Vec::new();
        while let Some(entry) = self.next_entry()? {
            out.push(entry);
        }
        Ok(out)
    }
}

/// Persistent contract state.
pub trait BlockchainStore: Send + Sync {
    /// Read a committed value.
    fn read_object(&self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Scan committed values with keys in `[start, limit)`.
    fn select_object(
        &self,
        contract_name: &str,
        start: &[u8],
        limit: &[u8],
    ) -> Result<Box<dyn StateIterator>, StoreError>;

    /// Open a savepoint for SQL-backed contract state.
    fn begin_savepoint(&self, _tx_id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    /// Discard everything written since the matching `begin_savepoint`.
    fn rollback_savepoint(&self, _tx_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Authorization checks available to contracts.
pub trait AccessControlProvider: Send + Sync {
    /// Whether `member_info` is a valid member of `org_id`.
    fn verify_member(&self, org_id: &str, member_info: &[u8]) -> Result<bool, AccessControlError>;
}

/// The per-block conflict snapshot.
///
/// Owns the admitted read/write tables for one block and decides, in a
/// single atomic step, whether an execution is still consistent with
/// everything admitted before it.
pub trait Snapshot: Send + Sync {
    /// Read `key` as visible to an execution pinned at `tx_exec_seq`.
    fn get_key(
        &self,
        tx_exec_seq: Option<usize>,
        contract_name: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Try to admit the execution held by `ctx`.
    ///
    /// Returns whether it was admitted and the admitted count afterwards.
    /// With `apply_special` the sealed check and the conflict check for
    /// special kinds are skipped; without it, special kinds are only
    /// queued for the sequential post-pass.
    fn apply_execution_result(
        &self,
        ctx: &mut dyn TxSimContext,
        special_kind: SpecialTxKind,
        vm_succeeded: bool,
        apply_special: bool,
    ) -> (bool, usize);

    /// Derive the dependency DAG from the admission order.
    fn build_dag(&self, is_sql: bool) -> Dag;

    fn is_sealed(&self) -> bool;

    /// Stop admitting regular executions.
    fn seal(&self);

    /// Number of admitted transactions.
    fn snapshot_size(&self) -> usize;

    /// Admitted transactions in admission order, results attached.
    fn tx_table(&self) -> Vec<Transaction>;

    /// Transactions deferred to the sequential post-pass.
    fn special_tx_table(&self) -> Vec<Transaction>;

    /// Admitted RW sets in admission order.
    fn tx_rwset_table(&self) -> Vec<TxRwSet>;

    fn tx_result_map(&self) -> HashMap<String, TxResult>;

    fn blockchain_store(&self) -> Arc<dyn BlockchainStore>;

    fn block_height(&self) -> u64;

    fn block_timestamp(&self) -> i64;

    fn block_proposer(&self) -> Vec<u8>;

    /// The snapshot of the parent block, if it is not yet persisted.
    fn pre_snapshot(&self) -> Option<Arc<dyn Snapshot>>;
}

/// The isolated view a contract executes against.
pub trait TxSimContext: Send {
    /// Read a value, preferring this execution's own writes.
    fn get(&mut self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Buffer a write.
    fn put(&mut self, contract_name: &str, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    /// Buffer a SQL record write.
    fn put_record(&mut self, contract_name: &str, value: Vec<u8>, sql_type: SqlType);

    /// Buffer a delete.
    fn del(&mut self, contract_name: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Scan `[start, limit)` including pending writes.
    fn select(
        &mut self,
        contract_name: &str,
        start: &[u8],
        limit: &[u8],
    ) -> Result<Box<dyn StateIterator>, StoreError>;

    /// Invoke another contract within this execution.
    fn call_contract(
        &mut self,
        contract: &Contract,
        method: &str,
        bytecode: &[u8],
        parameters: &Parameters,
        gas_used: u64,
        tx_type: TxType,
    ) -> (ContractResult, TxStatusCode);

    fn tx(&self) -> &Transaction;

    /// Admitted count at the time this context was created.
    fn tx_exec_seq(&self) -> usize;

    fn set_tx_exec_seq(&mut self, seq: usize);

    fn tx_result(&self) -> Option<&TxResult>;

    fn set_tx_result(&mut self, result: TxResult);

    /// Materialize the sorted RW set. The first call fixes the result.
    fn tx_rwset(&mut self, run_vm_success: bool) -> TxRwSet;

    /// Current nested call depth.
    fn depth(&self) -> usize;

    /// Result of the most recent nested call.
    fn current_result(&self) -> &[u8];

    /// Serialized creator of `contract_name`, if recorded.
    fn creator(&mut self, contract_name: &str) -> Option<Vec<u8>>;

    fn sender(&self) -> &[u8];

    fn block_height(&self) -> u64;

    fn block_proposer(&self) -> Vec<u8>;

    fn blockchain_store(&self) -> Arc<dyn BlockchainStore>;

    fn access_control(&self) -> Result<Arc<dyn AccessControlProvider>, AccessControlError>;
}

/// The contract virtual machine.
pub trait VmManager: Send + Sync {
    /// Run `method` on `contract`.
    ///
    /// Failures are reported through the status code, never as a panic.
    /// The returned kind tells the scheduler whether the execution needs
    /// strict global ordering.
    #[allow(clippy::too_many_arguments)]
    fn run_contract(
        &self,
        contract: &Contract,
        method: &str,
        bytecode: &[u8],
        parameters: &Parameters,
        ctx: &mut dyn TxSimContext,
        gas_used: u64,
        tx_type: TxType,
    ) -> (ContractResult, SpecialTxKind, TxStatusCode);

    fn access_control(&self) -> Option<Arc<dyn AccessControlProvider>>;
}
