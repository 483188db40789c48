//! # DAG Derivation
//!
//! Turns the admission-ordered RW sets of a sealed snapshot into the
//! minimal dependency DAG validators replay.
//!
//! ## Algorithm
//!
//! 1. Map every composite key to a dense index and build a read bitmap and
//!    a write bitmap per transaction.
//! 2. Build cumulative prefix bitmaps so a transaction that conflicts with
//!    nothing before it is recognised with three AND operations.
//! 3. For transaction `i`, walk `j = i-1 .. 0`. A `j` already reachable
//!    through an earlier edge is skipped; otherwise a conflict
//!    (`i` reads what `j` wrote, both write a key, or `i` writes what `j`
//!    read) adds a direct edge and folds `j`'s reachability row into `i`'s.
//!
//! Only direct edges are emitted, so the DAG is transitively reduced with
//! respect to the admission order.

use std::collections::HashMap;

use bitvec::prelude::*;
use shared_types::{Dag, TxRwSet};

type Bitmap = BitVec<u64, Lsb0>;

/// Derive the dependency DAG for `rwsets`, given in admission order.
///
/// With `is_sql` every vertex depends on its predecessor: SQL-backed state
/// cannot be conflict-checked key by key.
pub fn build_dag(rwsets: &[TxRwSet], is_sql: bool) -> Dag {
    let tx_count = rwsets.len();
    let mut dag = Dag::default();
    if tx_count == 0 {
        return dag;
    }

    if is_sql {
        for i in 0..tx_count {
            let neighbors = if i == 0 { vec![] } else { vec![(i - 1) as u32] };
            dag.push(neighbors);
        }
        return dag;
    }

    let (read_bitmaps, write_bitmaps) = build_rw_bitmaps(rwsets);
    let cumulative_read = build_cumulative(&read_bitmaps);
    let cumulative_write = build_cumulative(&write_bitmaps);

    // reach_map[i] holds every vertex i transitively depends on, plus i.
    let mut reach_map: Vec<Bitmap> = Vec::with_capacity(tx_count);

    for i in 0..tx_count {
        let read_i = &read_bitmaps[i];
        let write_i = &write_bitmaps[i];

        let mut reach_from_i = bitvec![u64, Lsb0; 0; tx_count];
        reach_from_i.set(i, true);
        let mut direct: Vec<u32> = Vec::new();

        if i > 0 && conflicted(read_i, write_i, &cumulative_read[i - 1], &cumulative_write[i - 1]) {
            for j in (0..i).rev() {
                if reach_from_i[j] {
                    continue;
                }
                if conflicted(read_i, write_i, &read_bitmaps[j], &write_bitmaps[j]) {
                    direct.push(j as u32);
                    or_assign(&mut reach_from_i, &reach_map[j]);
                }
            }
        }

        direct.reverse();
        reach_map.push(reach_from_i);
        dag.push(direct);
    }

    dag
}

/// One read bitmap and one write bitmap per transaction, all padded to the
/// same width.
fn build_rw_bitmaps(rwsets: &[TxRwSet]) -> (Vec<Bitmap>, Vec<Bitmap>) {
    let mut key_dict: HashMap<Vec<u8>, usize> = HashMap::with_capacity(1024);
    let mut read_indices: Vec<Vec<usize>> = Vec::with_capacity(rwsets.len());
    let mut write_indices: Vec<Vec<usize>> = Vec::with_capacity(rwsets.len());

    for rwset in rwsets {
        let reads = rwset
            .tx_reads
            .iter()
            .map(|r| key_index(&mut key_dict, r.composite_key()))
            .collect();
        let writes = rwset
            .tx_writes
            .iter()
            .map(|w| key_index(&mut key_dict, w.composite_key()))
            .collect();
        read_indices.push(reads);
        write_indices.push(writes);
    }

    let width = key_dict.len();
    (to_bitmaps(&read_indices, width), to_bitmaps(&write_indices, width))
}

fn key_index(dict: &mut HashMap<Vec<u8>, usize>, key: Vec<u8>) -> usize {
    let next = dict.len();
    *dict.entry(key).or_insert(next)
}

fn to_bitmaps(indices: &[Vec<usize>], width: usize) -> Vec<Bitmap> {
    indices
        .iter()
        .map(|set| {
            let mut bitmap = bitvec![u64, Lsb0; 0; width];
            for &idx in set {
                bitmap.set(idx, true);
            }
            bitmap
        })
        .collect()
}

fn build_cumulative(bitmaps: &[Bitmap]) -> Vec<Bitmap> {
    let mut out: Vec<Bitmap> = Vec::with_capacity(bitmaps.len());
    for (i, bitmap) in bitmaps.iter().enumerate() {
        let mut acc = bitmap.clone();
        if i > 0 {
            or_assign(&mut acc, &out[i - 1]);
        }
        out.push(acc);
    }
    out
}

fn conflicted(read_i: &Bitmap, write_i: &Bitmap, read_j: &Bitmap, write_j: &Bitmap) -> bool {
    intersects(read_i, write_j) || intersects(write_i, write_j) || intersects(write_i, read_j)
}

// Both operands always share a width, and bitvec keeps the padding bits of
// the last word zeroed, so word-wise operations are exact.
fn intersects(a: &Bitmap, b: &Bitmap) -> bool {
    a.as_raw_slice()
        .iter()
        .zip(b.as_raw_slice())
        .any(|(x, y)| x & y != 0)
}

fn or_assign(dst: &mut Bitmap, src: &Bitmap) {
    for (d, s) in dst.as_raw_mut_slice().iter_mut().zip(src.as_raw_slice()) {
        *d |= *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::{TxRead, TxWrite};

    fn make_rwset(tx_id: &str, reads: &[&str], writes: &[&str]) -> TxRwSet {
        TxRwSet {
            tx_id: tx_id.to_string(),
            tx_reads: reads
                .iter()
                .map(|k| TxRead {
                    contract_name: "kv".into(),
                    key: k.as_bytes().to_vec(),
                    value: None,
                })
                .collect(),
            tx_writes: writes
                .iter()
                .map(|k| TxWrite {
                    contract_name: "kv".into(),
                    key: k.as_bytes().to_vec(),
                    value: Some(b"v".to_vec()),
                })
                .collect(),
        }
    }

    fn neighbors(dag: &Dag, i: usize) -> Vec<u32> {
        dag.vertexes[i].neighbors.clone()
    }

    #[test]
    fn test_empty_table() {
        assert!(build_dag(&[], false).is_empty());
        assert!(build_dag(&[], true).is_empty());
    }

    #[test]
    fn test_independent_transactions_have_no_edges() {
        let rwsets = vec![
            make_rwset("t0", &["a"], &["a"]),
            make_rwset("t1", &["b"], &["b"]),
            make_rwset("t2", &["c"], &["c"]),
        ];
        let dag = build_dag(&rwsets, false);
        assert_eq!(dag.len(), 3);
        assert_eq!(dag.edge_count(), 0);
    }

    /// t0 writes a, t1 reads a and writes b, t2 reads b.
    /// Expected: t2 -> t1 -> t0, with no redundant t2 -> t0 edge.
    #[test]
    fn test_chain_is_transitively_reduced() {
        let rwsets = vec![
            make_rwset("t0", &[], &["a"]),
            make_rwset("t1", &["a"], &["b"]),
            make_rwset("t2", &["a", "b"], &[]),
        ];
        let dag = build_dag(&rwsets, false);
        assert_eq!(neighbors(&dag, 0), Vec::<u32>::new());
        assert_eq!(neighbors(&dag, 1), vec![0]);
        assert_eq!(neighbors(&dag, 2), vec![1]);
    }

    #[test]
    fn test_write_after_read_conflict() {
        let rwsets = vec![make_rwset("t0", &["a"], &[]), make_rwset("t1", &[], &["a"])];
        let dag = build_dag(&rwsets, false);
        assert_eq!(neighbors(&dag, 1), vec![0]);
    }

    #[test]
    fn test_write_write_conflict() {
        let rwsets = vec![make_rwset("t0", &[], &["a"]), make_rwset("t1", &[], &["a"])];
        let dag = build_dag(&rwsets, false);
        assert_eq!(neighbors(&dag, 1), vec![0]);
    }

    #[test]
    fn test_read_read_is_not_a_conflict() {
        let rwsets = vec![make_rwset("t0", &["a"], &[]), make_rwset("t1", &["a"], &[])];
        let dag = build_dag(&rwsets, false);
        assert_eq!(dag.edge_count(), 0);
    }

    /// Diamond: t1 and t2 both depend on t0, t3 depends on both.
    #[test]
    fn test_diamond() {
        let rwsets = vec![
            make_rwset("t0", &[], &["a", "b"]),
            make_rwset("t1", &["a"], &["c"]),
            make_rwset("t2", &["b"], &["d"]),
            make_rwset("t3", &["c", "d"], &[]),
        ];
        let dag = build_dag(&rwsets, false);
        assert_eq!(neighbors(&dag, 1), vec![0]);
        assert_eq!(neighbors(&dag, 2), vec![0]);
        assert_eq!(neighbors(&dag, 3), vec![1, 2]);
    }

    #[test]
    fn test_same_key_in_different_contracts_does_not_conflict() {
        let mut other = make_rwset("t1", &["a"], &[]);
        other.tx_reads[0].contract_name = "other".into();
        let rwsets = vec![make_rwset("t0", &[], &["a"]), other];
        let dag = build_dag(&rwsets, false);
        assert_eq!(dag.edge_count(), 0);
    }

    #[test]
    fn test_sql_mode_is_a_chain() {
        let rwsets = vec![
            make_rwset("t0", &[], &["a"]),
            make_rwset("t1", &[], &["b"]),
            make_rwset("t2", &[], &["c"]),
        ];
        let dag = build_dag(&rwsets, true);
        assert_eq!(neighbors(&dag, 0), Vec::<u32>::new());
        assert_eq!(neighbors(&dag, 1), vec![0]);
        assert_eq!(neighbors(&dag, 2), vec![1]);
    }

    fn reachable(dag: &Dag, from: usize, to: usize) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; dag.len()];
        while let Some(v) = stack.pop() {
            if v == to {
                return true;
            }
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            stack.extend(dag.vertexes[v].neighbors.iter().map(|n| *n as usize));
        }
        false
    }

    fn arb_rwsets() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
        prop::collection::vec(
            (
                prop::collection::vec(0u8..6, 0..3),
                prop::collection::vec(0u8..6, 0..3),
            ),
            1..24,
        )
    }

    proptest! {
        /// Every conflicting pair is ordered by a path, and every edge points
        /// backwards in admission order.
        #[test]
        fn prop_conflicts_are_ordered(sets in arb_rwsets()) {
            let rwsets: Vec<TxRwSet> = sets
                .iter()
                .enumerate()
                .map(|(i, (r, w))| {
                    let reads: Vec<String> = r.iter().map(|k| format!("k{k}")).collect();
                    let writes: Vec<String> = w.iter().map(|k| format!("k{k}")).collect();
                    let reads: Vec<&str> = reads.iter().map(String::as_str).collect();
                    let writes: Vec<&str> = writes.iter().map(String::as_str).collect();
                    make_rwset(&format!("t{i}"), &reads, &writes)
                })
                .collect();
            let dag = build_dag(&rwsets, false);
            prop_assert_eq!(dag.len(), rwsets.len());

            for (i, v) in dag.vertexes.iter().enumerate() {
                for n in &v.neighbors {
                    prop_assert!((*n as usize) < i);
                }
            }

            for i in 0..sets.len() {
                for j in 0..i {
                    let (ri, wi) = &sets[i];
                    let (rj, wj) = &sets[j];
                    let clash = ri.iter().any(|k| wj.contains(k))
                        || wi.iter().any(|k| wj.contains(k))
                        || wi.iter().any(|k| rj.contains(k));
                    if clash {
                        prop_assert!(reachable(&dag, i, j), "missing path {} -> {}", i, j);
                    }
                }
            }
        }
    }
}
