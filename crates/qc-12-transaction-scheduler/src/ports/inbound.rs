//! Inbound Ports (Driving Ports / API)

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{Block, Snapshot, Transaction};

use crate::domain::errors::SchedulerError;
use crate::domain::value_objects::{ReplayOutput, ScheduleOutput};

/// Primary Transaction Scheduler API
#[async_trait]
pub trait TransactionSchedulerApi: Send + Sync {
    /// Execute a batch for a block being proposed (discover mode).
    ///
    /// This is the main entry point. It:
    /// 1. Executes transactions concurrently against `snapshot`
    /// 2. Admits each execution through the snapshot's conflict check
    /// 3. Seals the snapshot and derives the DAG
    /// 4. Runs special transactions sequentially
    /// 5. Fills `block.txs` and `block.dag`
    ///
    /// A timeout or halt is not an error: whatever was admitted is returned
    /// and the rest must be proposed again later.
    async fn schedule(
        &self,
        block: &mut Block,
        txs: Vec<Transaction>,
        snapshot: Arc<dyn Snapshot>,
    ) -> Result<ScheduleOutput, SchedulerError>;

    /// Re-execute a received block following its DAG (replay mode).
    ///
    /// Fails unless every transaction is admitted within the replay budget.
    async fn simulate_with_dag(
        &self,
        block: &Block,
        snapshot: Arc<dyn Snapshot>,
    ) -> Result<ReplayOutput, SchedulerError>;

    /// Stop dispatching new work in the call currently running, if any.
    fn halt(&self);
}
