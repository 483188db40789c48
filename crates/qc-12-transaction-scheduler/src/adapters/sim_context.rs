//! Execution Context
//!
//! The isolated, per-attempt view a contract runs against. Reads fall
//! through the attempt's own overlays to the snapshot; writes stay local
//! until the snapshot admits the attempt.

use std::collections::BTreeMap;
use std::sync::Arc;

use shared_types::protocol::{creator_key, CALL_CONTRACT_DEPTH, GAS_LIMIT, SYSTEM_CONTRACT_STATE};
use shared_types::{
    composite_key, AccessControlError, AccessControlProvider, BlockchainStore, Contract,
    ContractResult, KvEntry, Parameters, Snapshot, SpecialTxKind, SqlType, StateIterator,
    StoreError, Transaction, TxRead, TxResult, TxRwSet, TxSimContext, TxStatusCode, TxType,
    TxWrite, VmManager,
};
use tracing::debug;

use super::iterator::{MergeIterator, WsetIterator};
use crate::domain::value_objects::CallRecord;

/// One execution attempt of one transaction.
pub struct TxSimContextImpl {
    tx: Transaction,
    snapshot: Arc<dyn Snapshot>,
    vm: Arc<dyn VmManager>,
    exec_seq: usize,
    tx_result: Option<TxResult>,
    tx_rwset: Option<TxRwSet>,
    read_map: BTreeMap<Vec<u8>, TxRead>,
    write_map: BTreeMap<Vec<u8>, TxWrite>,
    sql_writes: Vec<TxWrite>,
    ddl_writes: Vec<TxWrite>,
    depth: usize,
    gas_used: u64,
    current_result: Vec<u8>,
    history: Vec<CallRecord>,
    nested_special: SpecialTxKind,
}

impl TxSimContextImpl {
    /// Pin a fresh attempt at `exec_seq`, the snapshot size observed now.
    pub fn new(
        tx: Transaction,
        snapshot: Arc<dyn Snapshot>,
        vm: Arc<dyn VmManager>,
        exec_seq: usize,
    ) -> Self {
        Self {
            tx,
            snapshot,
            vm,
            exec_seq,
            tx_result: None,
            tx_rwset: None,
            read_map: BTreeMap::new(),
            write_map: BTreeMap::new(),
            sql_writes: Vec::new(),
            ddl_writes: Vec::new(),
            depth: 0,
            gas_used: 0,
            current_result: Vec::new(),
            history: Vec::new(),
            nested_special: SpecialTxKind::Normal,
        }
    }

    /// Completed nested calls, oldest first.
    pub fn call_history(&self) -> &[CallRecord] {
        &self.history
    }

    /// Special kind reported by any nested call, `Normal` if none.
    pub fn nested_special_kind(&self) -> SpecialTxKind {
        self.nested_special
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    fn put_into_read_set(&mut self, contract_name: &str, key: &[u8], value: Option<Vec<u8>>) {
        self.read_map.insert(
            composite_key(contract_name, key),
            TxRead {
                contract_name: contract_name.to_string(),
                key: key.to_vec(),
                value,
            },
        );
    }

    fn put_into_write_set(&mut self, contract_name: &str, key: &[u8], value: Option<Vec<u8>>) {
        self.write_map.insert(
            composite_key(contract_name, key),
            TxWrite {
                contract_name: contract_name.to_string(),
                key: key.to_vec(),
                value,
            },
        );
    }

    /// Writes visible to a scan of `contract_name` over `[start, limit)`:
    /// those already admitted to the snapshot, then this attempt's own.
    fn pending_writes_in_range(&self, contract_name: &str, start: &[u8], limit: &[u8]) -> Vec<KvEntry> {
        let in_range = |w: &TxWrite| {
            w.contract_name == contract_name
                && !w.key.is_empty()
                && w.key.as_slice() >= start
                && (limit.is_empty() || w.key.as_slice() < limit)
        };

        let admitted = self.snapshot.tx_rwset_table();
        admitted
            .iter()
            .flat_map(|rwset| rwset.tx_writes.iter())
            .chain(self.write_map.values())
            .filter(|w| in_range(*w))
            .map(|w| KvEntry::new(w.contract_name.clone(), w.key.clone(), w.value.clone()))
            .collect()
    }
}

impl TxSimContext for TxSimContextImpl {
    fn get(&mut self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let final_key = composite_key(contract_name, key);

        if let Some(write) = self.write_map.get(&final_key) {
            let value = write.value.clone();
            self.put_into_read_set(contract_name, key, value.clone());
            return Ok(value);
        }

        if let Some(read) = self.read_map.get(&final_key) {
            return Ok(read.value.clone());
        }

        let value = self
            .snapshot
            .get_key(Some(self.exec_seq), contract_name, key)?;
        self.put_into_read_set(contract_name, key, value.clone());
        Ok(value)
    }

    fn put(&mut self, contract_name: &str, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.put_into_write_set(contract_name, key, Some(value));
        Ok(())
    }

    fn put_record(&mut self, contract_name: &str, value: Vec<u8>, sql_type: SqlType) {
        let write = TxWrite {
            contract_name: contract_name.to_string(),
            key: Vec::new(),
            value: Some(value),
        };
        if sql_type == SqlType::Ddl {
            self.ddl_writes.push(write.clone());
        }
        self.sql_writes.push(write);
    }

    fn del(&mut self, contract_name: &str, key: &[u8]) -> Result<(), StoreError> {
        self.put_into_write_set(contract_name, key, None);
        Ok(())
    }

    fn select(
        &mut self,
        contract_name: &str,
        start: &[u8],
        limit: &[u8],
    ) -> Result<Box<dyn StateIterator>, StoreError> {
        let store = self.snapshot.blockchain_store();
        let base = store.select_object(contract_name, start, limit)?;

        let overlay = WsetIterator::new(self.pending_writes_in_range(contract_name, start, limit));
        if overlay.is_empty() {
            return Ok(base);
        }
        debug!(
            tx_id = self.tx.tx_id(),
            contract_name,
            pending = overlay.len(),
            "Merging pending writes into range scan"
        );
        Ok(Box::new(MergeIterator::new(Box::new(overlay), base)))
    }

    fn call_contract(
        &mut self,
        contract: &Contract,
        method: &str,
        bytecode: &[u8],
        parameters: &Parameters,
        gas_used: u64,
        tx_type: TxType,
    ) -> (ContractResult, TxStatusCode) {
        self.gas_used = gas_used;
        self.depth += 1;

        if self.depth > CALL_CONTRACT_DEPTH {
            let depth = self.depth;
            self.depth -= 1;
            return (
                ContractResult::fail(format!("CallContract too deep {depth}")),
                TxStatusCode::ContractTooDeepFailed,
            );
        }
        if self.gas_used > GAS_LIMIT {
            self.depth -= 1;
            return (
                ContractResult::fail(format!(
                    "There is not enough gas, gasUsed {gas_used} GasLimit {GAS_LIMIT}"
                )),
                TxStatusCode::InsufficientGas,
            );
        }

        let vm = Arc::clone(&self.vm);
        let (result, special_kind, code) =
            vm.run_contract(contract, method, bytecode, parameters, self, gas_used, tx_type);
        if special_kind.is_special() {
            self.nested_special = special_kind;
        }

        self.history.push(CallRecord {
            contract_name: contract.name.clone(),
            method: method.to_string(),
            parameters: parameters.clone(),
            depth: self.depth,
            gas_used: self.gas_used,
            status: code,
            result: result.result.clone(),
        });
        self.current_result = result.result.clone();
        self.depth -= 1;
        (result, code)
    }

    fn tx(&self) -> &Transaction {
        &self.tx
    }

    fn tx_exec_seq(&self) -> usize {
        self.exec_seq
    }

    fn set_tx_exec_seq(&mut self, seq: usize) {
        self.exec_seq = seq;
    }

    fn tx_result(&self) -> Option<&TxResult> {
        self.tx_result.as_ref()
    }

    fn set_tx_result(&mut self, result: TxResult) {
        self.tx_result = Some(result);
    }

    fn tx_rwset(&mut self, run_vm_success: bool) -> TxRwSet {
        if let Some(rwset) = &self.tx_rwset {
            return rwset.clone();
        }

        let mut rwset = TxRwSet::new(self.tx.tx_id());
        if run_vm_success {
            // BTreeMap iteration is already sorted by composite key.
            rwset.tx_reads = self.read_map.values().cloned().collect();
            rwset.tx_writes = self.write_map.values().cloned().collect();
            rwset.tx_writes.extend(self.sql_writes.iter().cloned());
        } else {
            rwset.tx_writes = self.ddl_writes.clone();
        }

        self.tx_rwset = Some(rwset.clone());
        rwset
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn current_result(&self) -> &[u8] {
        &self.current_result
    }

    fn creator(&mut self, contract_name: &str) -> Option<Vec<u8>> {
        self.get(SYSTEM_CONTRACT_STATE, &creator_key(contract_name))
            .ok()
            .flatten()
    }

    fn sender(&self) -> &[u8] {
        &self.tx.sender
    }

    fn block_height(&self) -> u64 {
        self.snapshot.block_height()
    }

    fn block_proposer(&self) -> Vec<u8> {
        self.snapshot.block_proposer()
    }

    fn blockchain_store(&self) -> Arc<dyn BlockchainStore> {
        self.snapshot.blockchain_store()
    }

    fn access_control(&self) -> Result<Arc<dyn AccessControlProvider>, AccessControlError> {
        self.vm.access_control().ok_or(AccessControlError::Unavailable)
    }
}
