//! Remaining-dependency bookkeeping for replay.
//!
//! Every vertex keeps the set of predecessors not yet admitted. When a
//! vertex is admitted it is removed from its successors' sets; a vertex
//! whose set empties becomes ready.

use std::collections::{BTreeMap, BTreeSet};

use shared_types::Dag;

/// Vertexes still waiting on predecessors.
#[derive(Debug, Default)]
pub struct DagRemain {
    pending: BTreeMap<usize, BTreeSet<usize>>,
    successors: Vec<Vec<usize>>,
    ready: BTreeSet<usize>,
}

impl DagRemain {
    /// Build from a validated DAG.
    pub fn from_dag(dag: &Dag) -> Self {
        let mut remain = Self {
            pending: BTreeMap::new(),
            successors: vec![Vec::new(); dag.len()],
            ready: BTreeSet::new(),
        };
        for (vertex, v) in dag.vertexes.iter().enumerate() {
            let preds: BTreeSet<usize> = v.neighbors.iter().map(|n| *n as usize).collect();
            for &pred in &preds {
                if let Some(succ) = remain.successors.get_mut(pred) {
                    succ.push(vertex);
                }
            }
            if preds.is_empty() {
                remain.ready.insert(vertex);
            } else {
                remain.pending.insert(vertex, preds);
            }
        }
        remain
    }

    /// Record that `done` was admitted.
    pub fn shrink(&mut self, done: usize) {
        let Some(successors) = self.successors.get(done) else {
            return;
        };
        for succ in successors {
            let Some(preds) = self.pending.get_mut(succ) else {
                continue;
            };
            preds.remove(&done);
            if preds.is_empty() {
                self.pending.remove(succ);
                self.ready.insert(*succ);
            }
        }
    }

    /// Take every vertex whose predecessors are all admitted, lowest first.
    pub fn pop_ready(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.ready).into_iter().collect()
    }

    /// Vertexes neither ready nor handed out yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
