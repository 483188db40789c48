//! Kahn's Topological Sort over a block DAG
//!
//! O(V + E). Used to reject a received DAG before replaying it: a cycle or
//! a dangling edge would otherwise stall replay until its timeout.

use shared_types::Dag;

use crate::domain::errors::DagError;
use crate::domain::value_objects::DagShape;

/// Check that `dag` can drive a replay of `tx_count` transactions.
///
/// Returns the level structure Kahn's algorithm finds: vertexes in the
/// same level have no path between them and may run concurrently.
pub fn validate_dag(dag: &Dag, tx_count: usize) -> Result<DagShape, DagError> {
    let n = dag.len();
    if n != tx_count {
        return Err(DagError::VertexCountMismatch {
            vertexes: n,
            txs: tx_count,
        });
    }
    if n == 0 {
        return Ok(DagShape::default());
    }

    // 1. In-degree per vertex and successor lists
    let mut in_degree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (vertex, v) in dag.vertexes.iter().enumerate() {
        let mut preds: Vec<u32> = v.neighbors.clone();
        preds.sort_unstable();
        preds.dedup();
        for neighbor in preds {
            let idx = neighbor as usize;
            if idx >= n || idx == vertex {
                return Err(DagError::InvalidNeighbor { vertex, neighbor });
            }
            in_degree[vertex] += 1;
            successors[idx].push(vertex);
        }
    }

    // 2. Seed with zero in-degree vertexes
    let mut queue: Vec<usize> = (0..n).filter(|&v| in_degree[v] == 0).collect();

    // 3. Peel level by level
    let mut shape = DagShape::default();
    let mut scheduled = 0;
    while !queue.is_empty() {
        let level = std::mem::take(&mut queue);
        shape.depth += 1;
        shape.max_parallelism = shape.max_parallelism.max(level.len());
        scheduled += level.len();

        for vertex in level {
            for &succ in &successors[vertex] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    queue.push(succ);
                }
            }
        }
    }

    // 4. Anything left is on a cycle
    if scheduled < n {
        return Err(DagError::CycleDetected {
            unresolved: n - scheduled,
        });
    }

    Ok(shape)
}
