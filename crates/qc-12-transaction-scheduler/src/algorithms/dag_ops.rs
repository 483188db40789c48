//! DAG helpers used after the main round.

use std::fmt::Write;

use shared_types::{Dag, Transaction};

/// Append a vertex for a special transaction: it depends on every vertex
/// already in the DAG, including earlier special transactions.
pub fn append_special_vertex(dag: &mut Dag) -> usize {
    let index = dag.len();
    dag.push((0..index as u32).collect());
    index
}

/// Render `dag` as a Graphviz digraph labelled by short tx ids.
pub fn dump_dag(dag: &Dag, txs: &[Transaction]) -> String {
    let label = |i: usize| -> String {
        let id = txs.get(i).map(Transaction::tx_id).unwrap_or("?");
        id.chars().take(8).collect()
    };

    let mut out = String::from("digraph DAG {\n");
    for (i, v) in dag.vertexes.iter().enumerate() {
        if v.neighbors.is_empty() {
            let _ = writeln!(out, "id_{} -> begin;", label(i));
            continue;
        }
        for n in &v.neighbors {
            let _ = writeln!(out, "id_{} -> id_{};", label(i), label(*n as usize));
        }
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_vertexes_depend_on_everything_before() {
        let mut dag = Dag::default();
        dag.push(vec![]);
        dag.push(vec![]);
        assert_eq!(append_special_vertex(&mut dag), 2);
        assert_eq!(append_special_vertex(&mut dag), 3);
        assert_eq!(dag.vertexes[2].neighbors, vec![0, 1]);
        assert_eq!(dag.vertexes[3].neighbors, vec![0, 1, 2]);
    }

    #[test]
    fn test_special_vertex_on_empty_dag_is_a_root() {
        let mut dag = Dag::default();
        append_special_vertex(&mut dag);
        assert!(dag.vertexes[0].neighbors.is_empty());
    }

    #[test]
    fn test_dump_dag() {
        let mut dag = Dag::default();
        dag.push(vec![]);
        dag.push(vec![0]);
        let txs = vec![
            Transaction::new("aaaaaaaa1111", "kv", "put"),
            Transaction::new("bbbbbbbb2222", "kv", "put"),
        ];
        assert_eq!(
            dump_dag(&dag, &txs),
            "digraph DAG {\nid_aaaaaaaa -> begin;\nid_bbbbbbbb -> id_aaaaaaaa;\n}"
        );
    }
}
