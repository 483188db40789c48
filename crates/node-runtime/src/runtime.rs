//! # Node Runtime
//!
//! One round per block height:
//!
//! ```text
//! generate_batch ──→ proposer.schedule (discover) ──→ Block { txs, dag }
//!                                                         │
//!                          verifier.simulate_with_dag ←───┘ (fresh snapshot)
//!                                    │
//!                     RW sets and result hashes must agree
//!                                    │
//!                         MemoryStore::commit_rwsets
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use qc_04_state_management::SnapshotImpl;
use qc_12_transaction_scheduler::TransactionSchedulerApi;
use shared_types::{Block, BlockHeader, Snapshot};
use tracing::{info, warn};

use crate::adapters::BANK_CONTRACT;
use crate::container::{NodeConfig, NodeContainer};
use crate::workload::generate_batch;

/// What one round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub height: u64,
    pub submitted: usize,
    pub admitted: usize,
    pub dag_edges: usize,
    pub failed: usize,
    pub events: usize,
}

pub struct NodeRuntime {
    container: Arc<NodeContainer>,
    stopping: AtomicBool,
}

impl NodeRuntime {
    /// Wire the node and write genesis state.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let container = NodeContainer::new(config).context("Failed to initialize genesis state")?;
        Ok(Self {
            container: Arc::new(container),
            stopping: AtomicBool::new(false),
        })
    }

    pub fn container(&self) -> Arc<NodeContainer> {
        Arc::clone(&self.container)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.container.config
    }

    /// Wake any scheduling or replay in progress and refuse further rounds.
    pub fn halt(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.container.proposer.halt();
        self.container.verifier.halt();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn make_header(&self, height: u64) -> BlockHeader {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        BlockHeader {
            chain_id: self.container.config.chain_id.clone(),
            block_height: height,
            proposer: b"node-runtime".to_vec(),
            block_timestamp: timestamp,
            ..BlockHeader::default()
        }
    }

    fn make_snapshot(&self, header: &BlockHeader) -> Arc<dyn Snapshot> {
        Arc::new(SnapshotImpl::new(self.container.store.clone(), header))
    }

    /// Propose, verify and commit the block at `height`.
    pub async fn run_round(&self, height: u64) -> Result<RoundReport> {
        if self.is_stopping() {
            bail!("Node is stopping, block {height} not scheduled");
        }
        let container = &self.container;
        let txs = generate_batch(&container.config.workload, height);
        let submitted = txs.len();
        let mut block = Block::new(self.make_header(height));
        let snapshot = self.make_snapshot(&block.header);

        let started = Instant::now();
        let proposal = container
            .proposer
            .schedule(&mut block, txs, snapshot)
            .await
            .with_context(|| format!("Failed to schedule block {height}"))?;
        let scheduled_in = started.elapsed();

        let started = Instant::now();
        let replay = container
            .verifier
            .simulate_with_dag(&block, self.make_snapshot(&block.header))
            .await
            .with_context(|| format!("Failed to replay block {height}"))?;
        let replayed_in = started.elapsed();

        for tx in &block.txs {
            let proposed = proposal.rwsets.get(tx.tx_id());
            let replayed = replay.rwsets.get(tx.tx_id());
            if proposed != replayed {
                bail!("Block {height}: replay diverged on RW set of tx {}", tx.tx_id());
            }
            let proposed_hash = tx.result.as_ref().and_then(|r| r.rw_set_hash);
            let replayed_hash = replay.results.get(tx.tx_id()).and_then(|r| r.rw_set_hash);
            if proposed_hash != replayed_hash {
                bail!("Block {height}: replay diverged on result of tx {}", tx.tx_id());
            }
        }

        container
            .store
            .commit_rwsets(block.txs.iter().filter_map(|tx| proposal.rwsets.get(tx.tx_id())));
        self.check_supply(height)?;

        let report = RoundReport {
            height,
            submitted,
            admitted: block.txs.len(),
            dag_edges: block.dag.edge_count(),
            failed: block
                .txs
                .iter()
                .filter(|tx| tx.result.as_ref().is_some_and(|r| !r.code.is_success()))
                .count(),
            events: proposal.events.values().map(Vec::len).sum(),
        };
        if report.admitted < report.submitted {
            warn!(
                height,
                submitted = report.submitted,
                admitted = report.admitted,
                "Block left transactions behind"
            );
        }
        info!(
            height,
            admitted = report.admitted,
            dag_edges = report.dag_edges,
            failed = report.failed,
            events = report.events,
            schedule_ms = scheduled_in.as_millis() as u64,
            replay_ms = replayed_in.as_millis() as u64,
            "Block committed"
        );
        Ok(report)
    }

    /// Transfers move funds, they never create or destroy them.
    fn check_supply(&self, height: u64) -> Result<()> {
        let total: u64 = self
            .container
            .store
            .dump()
            .iter()
            .filter(|entry| entry.contract_name == BANK_CONTRACT)
            .filter_map(|entry| entry.value.as_deref())
            .filter_map(|value| std::str::from_utf8(value).ok()?.parse::<u64>().ok())
            .sum();
        let expected = self.container.genesis.total_supply;
        if total != expected {
            bail!("Block {height}: total supply is {total}, expected {expected}");
        }
        Ok(())
    }
}
