//! # Conflict Snapshot
//!
//! The per-block versioned state view every execution attempt reads from
//! and is admitted into.
//!
//! ## Admission (optimistic concurrency control)
//!
//! An execution context is pinned at `exec_seq`, the admitted count when it
//! was created. At admission, each of its reads is checked against the write
//! table: a key written by a transaction admitted at `seq >= exec_seq` was
//! not visible to the attempt, so the attempt is stale and rejected. The
//! check and the merge of the write set happen under one lock.
//!
//! ## Lifecycle
//!
//! `new` → concurrent `apply_execution_result` → `seal` → `build_dag` →
//! special transactions applied with `apply_special` → discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{
    BlockHeader, BlockchainStore, Dag, Snapshot, SpecialTxKind, StoreError, Transaction, TxResult,
    TxRwSet, TxSimContext,
};
use tracing::{debug, warn};

use super::dag_builder;

/// A value together with the admission sequence that recorded it.
#[derive(Debug, Clone)]
struct StateVersion {
    seq: usize,
    value: Option<Vec<u8>>,
}

/// Everything admitted so far. Guarded by a single lock.
#[derive(Default)]
struct SnapshotTables {
    read_table: HashMap<Vec<u8>, StateVersion>,
    write_table: HashMap<Vec<u8>, StateVersion>,
    tx_table: Vec<Transaction>,
    special_tx_table: Vec<Transaction>,
    tx_rwset_table: Vec<TxRwSet>,
    tx_result_map: HashMap<String, TxResult>,
}

impl SnapshotTables {
    /// First read that a write admitted at or after `exec_seq` invalidated.
    fn stale_read(&self, rwset: &TxRwSet, exec_seq: usize) -> Option<(Vec<u8>, usize)> {
        rwset.tx_reads.iter().find_map(|read| {
            let key = read.composite_key();
            match self.write_table.get(&key) {
                Some(version) if version.seq >= exec_seq => Some((key, version.seq)),
                _ => None,
            }
        })
    }

    fn commit(&mut self, tx: Transaction, rwset: TxRwSet, result: TxResult) {
        let seq = self.tx_table.len();
        for read in &rwset.tx_reads {
            self.read_table.insert(
                read.composite_key(),
                StateVersion {
                    seq,
                    value: read.value.clone(),
                },
            );
        }
        for write in &rwset.tx_writes {
            self.write_table.insert(
                write.composite_key(),
                StateVersion {
                    seq,
                    value: write.value.clone(),
                },
            );
        }
        self.tx_result_map.insert(tx.tx_id().to_string(), result);
        self.tx_rwset_table.push(rwset);
        self.tx_table.push(tx);
    }

    fn local_value(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.write_table
            .get(key)
            .or_else(|| self.read_table.get(key))
            .map(|version| version.value.clone())
    }
}

/// The conflict snapshot for one block.
pub struct SnapshotImpl {
    store: Arc<dyn BlockchainStore>,
    pre_snapshot: Option<Arc<dyn Snapshot>>,
    block_height: u64,
    block_timestamp: i64,
    block_proposer: Vec<u8>,
    sealed: AtomicBool,
    tables: Mutex<SnapshotTables>,
}

impl SnapshotImpl {
    /// Create an unsealed, empty snapshot for the block described by `header`.
    pub fn new(store: Arc<dyn BlockchainStore>, header: &BlockHeader) -> Self {
        Self {
            store,
            pre_snapshot: None,
            block_height: header.block_height,
            block_timestamp: header.block_timestamp,
            block_proposer: header.proposer.clone(),
            sealed: AtomicBool::new(false),
            tables: Mutex::new(SnapshotTables::default()),
        }
    }

    /// Chain onto the snapshot of a parent block that is not yet persisted.
    pub fn with_pre_snapshot(mut self, pre_snapshot: Arc<dyn Snapshot>) -> Self {
        self.pre_snapshot = Some(pre_snapshot);
        self
    }
}

impl Snapshot for SnapshotImpl {
    fn get_key(
        &self,
        _tx_exec_seq: Option<usize>,
        contract_name: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let final_key = shared_types::composite_key(contract_name, key);
        if let Some(value) = self.tables.lock().local_value(&final_key) {
            return Ok(value);
        }

        match &self.pre_snapshot {
            Some(pre) => pre.get_key(None, contract_name, key),
            None => self.store.read_object(contract_name, key),
        }
    }

    fn apply_execution_result(
        &self,
        ctx: &mut dyn TxSimContext,
        special_kind: SpecialTxKind,
        vm_succeeded: bool,
        apply_special: bool,
    ) -> (bool, usize) {
        debug!(
            tx_id = ctx.tx().tx_id(),
            ?special_kind,
            vm_succeeded,
            apply_special,
            "Applying execution result"
        );

        if !apply_special && self.is_sealed() {
            return (false, self.snapshot_size());
        }

        let mut tables = self.tables.lock();
        // Sealing may have raced with taking the lock.
        if !apply_special && self.is_sealed() {
            return (false, tables.tx_table.len());
        }

        if !apply_special && special_kind.is_special() {
            tables.special_tx_table.push(ctx.tx().clone());
            return (true, tables.tx_table.len() + tables.special_tx_table.len());
        }

        let exec_seq = ctx.tx_exec_seq();
        let rwset = ctx.tx_rwset(vm_succeeded);
        let result = ctx.tx_result().cloned().unwrap_or_default();

        if !special_kind.is_special() && exec_seq < tables.tx_table.len() {
            if let Some((key, seq)) = tables.stale_read(&rwset, exec_seq) {
                debug!(
                    tx_id = ctx.tx().tx_id(),
                    key = %hex::encode(&key),
                    written_at = seq,
                    exec_seq,
                    "Read set is stale, rejecting"
                );
                return (false, tables.tx_table.len());
            }
        }

        let mut tx = ctx.tx().clone();
        tx.result = Some(result.clone());
        tables.commit(tx, rwset, result);
        debug!(
            tx_id = ctx.tx().tx_id(),
            rwset_table_size = tables.tx_rwset_table.len(),
            "Execution admitted"
        );
        (true, tables.tx_table.len())
    }

    fn build_dag(&self, is_sql: bool) -> Dag {
        if !self.is_sealed() {
            warn!(
                block_height = self.block_height,
                "Building DAG from an unsealed snapshot"
            );
        }
        let tables = self.tables.lock();
        debug!(
            block_height = self.block_height,
            tx_count = tables.tx_table.len(),
            "Building DAG"
        );
        dag_builder::build_dag(&tables.tx_rwset_table, is_sql)
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    fn snapshot_size(&self) -> usize {
        self.tables.lock().tx_table.len()
    }

    fn tx_table(&self) -> Vec<Transaction> {
        self.tables.lock().tx_table.clone()
    }

    fn special_tx_table(&self) -> Vec<Transaction> {
        self.tables.lock().special_tx_table.clone()
    }

    fn tx_rwset_table(&self) -> Vec<TxRwSet> {
        self.tables.lock().tx_rwset_table.clone()
    }

    fn tx_result_map(&self) -> HashMap<String, TxResult> {
        self.tables.lock().tx_result_map.clone()
    }

    fn blockchain_store(&self) -> Arc<dyn BlockchainStore> {
        Arc::clone(&self.store)
    }

    fn block_height(&self) -> u64 {
        self.block_height
    }

    fn block_timestamp(&self) -> i64 {
        self.block_timestamp
    }

    fn block_proposer(&self) -> Vec<u8> {
        self.block_proposer.clone()
    }

    fn pre_snapshot(&self) -> Option<Arc<dyn Snapshot>> {
        self.pre_snapshot.clone()
    }
}
