use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use shared_types::{BlockchainStore, KvEntry, StateIterator, StoreError, TxRwSet};

type StateKey = (String, Vec<u8>);

/// In-memory implementation of BlockchainStore for testing and local runs.
///
/// Savepoint hooks do nothing but count their calls.
pub struct MemoryStore {
    state: RwLock<BTreeMap<StateKey, Vec<u8>>>,
    savepoints_begun: AtomicUsize,
    savepoints_rolled_back: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BTreeMap::new()),
            savepoints_begun: AtomicUsize::new(0),
            savepoints_rolled_back: AtomicUsize::new(0),
        }
    }

    pub fn put(&self, contract_name: &str, key: &[u8], value: Vec<u8>) {
        self.state
            .write()
            .insert((contract_name.to_string(), key.to_vec()), value);
    }

    /// Persist the writes of a block, in block order. Tombstones delete;
    /// SQL records (empty keys) are not key/value state and are skipped.
    pub fn commit_rwsets<'a>(&self, rwsets: impl IntoIterator<Item = &'a TxRwSet>) {
        let mut state = self.state.write();
        for rwset in rwsets {
            for write in rwset.tx_writes.iter().filter(|w| !w.key.is_empty()) {
                let key = (write.contract_name.clone(), write.key.clone());
                match &write.value {
                    Some(value) => {
                        state.insert(key, value.clone());
                    }
                    None => {
                        state.remove(&key);
                    }
                }
            }
        }
    }

    /// Every entry, ordered by contract then key.
    pub fn dump(&self) -> Vec<KvEntry> {
        self.state
            .read()
            .iter()
            .map(|((contract, key), value)| KvEntry::new(contract.clone(), key.clone(), Some(value.clone())))
            .collect()
    }

    pub fn savepoints_begun(&self) -> usize {
        self.savepoints_begun.load(Ordering::Relaxed)
    }

    pub fn savepoints_rolled_back(&self) -> usize {
        self.savepoints_rolled_back.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockchainStore for MemoryStore {
    fn read_object(&self, contract_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.state.read();
        Ok(state.get(&(contract_name.to_string(), key.to_vec())).cloned())
    }

    /// An empty `limit` leaves the range unbounded above.
    fn select_object(
        &self,
        contract_name: &str,
        start: &[u8],
        limit: &[u8],
    ) -> Result<Box<dyn StateIterator>, StoreError> {
        if !limit.is_empty() && start > limit {
            return Err(StoreError::InvalidRange {
                start: hex::encode(start),
                limit: hex::encode(limit),
            });
        }

        let state = self.state.read();
        let from = (contract_name.to_string(), start.to_vec());
        let entries: Vec<KvEntry> = state
            .range(from..)
            .take_while(|((contract, key), _)| {
                contract == contract_name && (limit.is_empty() || key.as_slice() < limit)
            })
            .map(|((contract, key), value)| KvEntry::new(contract.clone(), key.clone(), Some(value.clone())))
            .collect();

        Ok(Box::new(VecIterator::new(entries)))
    }

    fn begin_savepoint(&self, _tx_id: &str) -> Result<(), StoreError> {
        self.savepoints_begun.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback_savepoint(&self, _tx_id: &str) -> Result<(), StoreError> {
        self.savepoints_rolled_back.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Iterator over a materialized, already ordered range.
pub struct VecIterator {
    entries: std::vec::IntoIter<KvEntry>,
}

impl VecIterator {
    pub fn new(entries: Vec<KvEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl StateIterator for VecIterator {
    fn next_entry(&mut self) -> Result<Option<KvEntry>, StoreError> {
        Ok(self.entries.next())
    }

    fn release(&mut self) {
        self.entries = Vec::new().into_iter();
    }
}
