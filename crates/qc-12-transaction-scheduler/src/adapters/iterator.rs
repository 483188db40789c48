//! Range iterators that overlay pending writes on persisted state.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use shared_types::{KvEntry, StateIterator, StoreError};

/// Drains a set of pending writes in key order.
///
/// Entries are removed as they are yielded; the iterator cannot be rewound.
#[derive(Debug, Default)]
pub struct WsetIterator {
    entries: BTreeMap<Vec<u8>, KvEntry>,
}

impl WsetIterator {
    /// Build from entries keyed by their bare key. Later entries for the
    /// same key replace earlier ones.
    pub fn new(entries: impl IntoIterator<Item = KvEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.key.clone(), e)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateIterator for WsetIterator {
    fn next_entry(&mut self) -> Result<Option<KvEntry>, StoreError> {
        Ok(self.entries.pop_first().map(|(_, entry)| entry))
    }

    fn release(&mut self) {
        self.entries.clear();
    }
}

/// Merges an overlay iterator onto a base iterator.
///
/// Both inputs must yield keys in ascending order. On equal keys the overlay
/// entry is returned and the base entry is dropped, so tombstones in the
/// overlay surface as entries with no value.
pub struct MergeIterator {
    overlay: Box<dyn StateIterator>,
    base: Box<dyn StateIterator>,
    overlay_cache: Option<KvEntry>,
    base_cache: Option<KvEntry>,
    overlay_done: bool,
    base_done: bool,
}

impl MergeIterator {
    pub fn new(overlay: Box<dyn StateIterator>, base: Box<dyn StateIterator>) -> Self {
        Self {
            overlay,
            base,
            overlay_cache: None,
            base_cache: None,
            overlay_done: false,
            base_done: false,
        }
    }

    fn fill(&mut self) -> Result<(), StoreError> {
        if self.overlay_cache.is_none() && !self.overlay_done {
            self.overlay_cache = self.overlay.next_entry()?;
            self.overlay_done = self.overlay_cache.is_none();
        }
        if self.base_cache.is_none() && !self.base_done {
            self.base_cache = self.base.next_entry()?;
            self.base_done = self.base_cache.is_none();
        }
        Ok(())
    }
}

impl StateIterator for MergeIterator {
    fn next_entry(&mut self) -> Result<Option<KvEntry>, StoreError> {
        self.fill()?;
        let next = match (&self.overlay_cache, &self.base_cache) {
            (None, None) => None,
            (Some(_), None) => self.overlay_cache.take(),
            (None, Some(_)) => self.base_cache.take(),
            (Some(o), Some(b)) => match o.key.cmp(&b.key) {
                Ordering::Less => self.overlay_cache.take(),
                Ordering::Greater => self.base_cache.take(),
                Ordering::Equal => {
                    self.base_cache = None;
                    self.overlay_cache.take()
                }
            },
        };
        Ok(next)
    }

    fn release(&mut self) {
        self.overlay.release();
        self.base.release();
        self.overlay_cache = None;
        self.base_cache = None;
        self.overlay_done = true;
        self.base_done = true;
    }
}
