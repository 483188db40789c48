//! Transaction Scheduler Service
//!
//! Main service implementing `TransactionSchedulerApi`.
//!
//! Both modes run the same event loop: one driver task multiplexes new
//! work, completions, finish, timeout and halt, and hands executions to a
//! bounded worker pool. All per-transaction conflict control lives in the
//! snapshot's admission step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use shared_types::{Block, Snapshot, Transaction, TxRwSet, VmManager};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::pool::WorkerPool;
use super::vm_runner::execute;
use crate::adapters::TxSimContextImpl;
use crate::algorithms::{append_special_vertex, dump_dag, validate_dag, DagRemain};
use crate::config::SchedulerConfig;
use crate::domain::errors::SchedulerError;
use crate::domain::value_objects::{LoopExit, ReplayOutput, ScheduleOutput};
use crate::ports::inbound::TransactionSchedulerApi;

/// Everything one execution job needs. Cloned into every job.
#[derive(Clone)]
struct Worker {
    snapshot: Arc<dyn Snapshot>,
    vm: Arc<dyn VmManager>,
    txs: Arc<Vec<Transaction>>,
    work_tx: mpsc::UnboundedSender<usize>,
    finish_tx: mpsc::UnboundedSender<()>,
    /// Set in replay mode; admitted vertexes are reported here
    done_tx: Option<mpsc::UnboundedSender<usize>>,
    total: usize,
    enable_sql: bool,
    retry_backoff: Option<Duration>,
}

impl Worker {
    /// A worker over `txs` plus the receiving ends of its work and finish
    /// channels. `done_tx` is set in replay mode.
    fn new(
        snapshot: Arc<dyn Snapshot>,
        vm: Arc<dyn VmManager>,
        txs: Arc<Vec<Transaction>>,
        config: &SchedulerConfig,
        done_tx: Option<mpsc::UnboundedSender<usize>>,
    ) -> (Self, mpsc::UnboundedReceiver<usize>, mpsc::UnboundedReceiver<()>) {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (finish_tx, finish_rx) = mpsc::unbounded_channel();
        let total = txs.len();
        let worker = Self {
            snapshot,
            vm,
            txs,
            work_tx,
            finish_tx,
            done_tx,
            total,
            enable_sql: config.enable_sql_support,
            retry_backoff: config.retry_backoff,
        };
        (worker, work_rx, finish_rx)
    }

    /// Execute `txs[index]` once and try to admit it.
    ///
    /// Runs on a blocking thread.
    fn run(&self, index: usize) {
        if self.snapshot.is_sealed() {
            return;
        }
        let Some(tx) = self.txs.get(index) else {
            return;
        };

        let exec_seq = self.snapshot.snapshot_size();
        let mut ctx = TxSimContextImpl::new(
            tx.clone(),
            Arc::clone(&self.snapshot),
            Arc::clone(&self.vm),
            exec_seq,
        );
        let outcome = execute(&mut ctx, self.vm.as_ref(), self.enable_sql);

        let replay = self.done_tx.is_some();
        let apply_special = replay && outcome.special_kind.is_special();
        let (admitted, size) = self.snapshot.apply_execution_result(
            &mut ctx,
            outcome.special_kind,
            outcome.vm_succeeded,
            apply_special,
        );

        if admitted {
            debug!(tx_id = tx.tx_id(), size, "Admitted");
            if let Some(done_tx) = &self.done_tx {
                let _ = done_tx.send(index);
            }
        } else if !self.snapshot.is_sealed() {
            debug!(tx_id = tx.tx_id(), exec_seq, "Conflict, retrying");
            if let Some(backoff) = self.retry_backoff {
                std::thread::sleep(backoff);
            }
            let _ = self.work_tx.send(index);
        }

        if size >= self.total {
            let _ = self.finish_tx.send(());
        }
    }
}

/// Optimistic parallel transaction scheduler.
pub struct TxScheduler {
    vm: Arc<dyn VmManager>,
    config: SchedulerConfig,
    /// Serializes schedule and replay calls on this instance
    lock: Mutex<()>,
    halt_tx: watch::Sender<bool>,
}

impl TxScheduler {
    pub fn new(vm: Arc<dyn VmManager>, config: SchedulerConfig) -> Self {
        let (halt_tx, _) = watch::channel(false);
        Self {
            vm,
            config,
            lock: Mutex::new(()),
            halt_tx,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Clear any earlier halt and watch for the next one. Called as soon
    /// as a call holds the lock, so a halt during setup is kept.
    fn arm_halt(&self) -> watch::Receiver<bool> {
        self.halt_tx.send_replace(false);
        self.halt_tx.subscribe()
    }

    /// Drive `worker` until every transaction is admitted, `timeout`
    /// elapses, or halt is requested. `seed` is the initial work.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        mut halt_rx: watch::Receiver<bool>,
        pool: WorkerPool,
        worker: Worker,
        seed: Vec<usize>,
        mut work_rx: mpsc::UnboundedReceiver<usize>,
        mut finish_rx: mpsc::UnboundedReceiver<()>,
        mut done: Option<(mpsc::UnboundedReceiver<usize>, DagRemain)>,
        timeout: Duration,
    ) -> LoopExit {
        if *halt_rx.borrow_and_update() {
            pool.close();
            worker.snapshot.seal();
            return LoopExit::Halted;
        }

        for index in seed {
            let _ = worker.work_tx.send(index);
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let exit = loop {
            tokio::select! {
                biased;

                Some(()) = finish_rx.recv() => break LoopExit::Finished,

                () = &mut deadline => break LoopExit::TimedOut,

                Ok(()) = halt_rx.changed() => {
                    if *halt_rx.borrow() {
                        break LoopExit::Halted;
                    }
                }

                Some(index) = async {
                    match done.as_mut() {
                        Some((done_rx, _)) => done_rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Some((_, remain)) = done.as_mut() {
                        remain.shrink(index);
                        for ready in remain.pop_ready() {
                            let _ = worker.work_tx.send(ready);
                        }
                    }
                }

                Some(index) = work_rx.recv() => {
                    let job = worker.clone();
                    pool.submit(move || job.run(index));
                }
            }
        };

        pool.close();
        worker.snapshot.seal();
        exit
    }

    /// Run deferred special transactions one by one after the main round.
    ///
    /// Each one is admitted unconditionally and appended to `block.dag`
    /// as depending on every vertex before it. `block.dag` gets a vertex
    /// for every admitted special even when the pass itself fails.
    async fn run_specials(&self, snapshot: &Arc<dyn Snapshot>, block: &mut Block) -> Result<usize, SchedulerError> {
        let specials = snapshot.special_tx_table();
        if specials.is_empty() {
            return Ok(0);
        }
        info!(
            block_height = block.header.block_height,
            count = specials.len(),
            "Running special transactions"
        );

        let main_round = block.dag.len();
        let pass = {
            let snapshot = Arc::clone(snapshot);
            let vm = Arc::clone(&self.vm);
            let enable_sql = self.config.enable_sql_support;
            tokio::task::spawn_blocking(move || {
                for tx in specials {
                    let exec_seq = snapshot.snapshot_size();
                    let mut ctx = TxSimContextImpl::new(tx, Arc::clone(&snapshot), Arc::clone(&vm), exec_seq);
                    let outcome = execute(&mut ctx, vm.as_ref(), enable_sql);
                    snapshot.apply_execution_result(&mut ctx, outcome.special_kind, outcome.vm_succeeded, true);
                }
            })
            .await
        };

        while block.dag.len() < snapshot.snapshot_size() {
            append_special_vertex(&mut block.dag);
        }
        pass.map_err(|e| SchedulerError::Concurrency(e.to_string()))?;
        Ok(block.dag.len() - main_round)
    }

    fn log_rwsets(&self, rwsets: &[TxRwSet]) {
        if !self.config.rwset_log {
            return;
        }
        for rwset in rwsets {
            debug!(tx_id = %rwset.tx_id, ?rwset, "Admitted RW set");
        }
    }
}

/// Drop repeated tx ids, keeping the first occurrence.
fn dedupe(txs: Vec<Transaction>) -> Vec<Transaction> {
    let mut seen = HashSet::new();
    txs.into_iter()
        .filter(|tx| {
            let fresh = seen.insert(tx.tx_id().to_string());
            if !fresh {
                warn!(tx_id = tx.tx_id(), "Duplicate transaction in batch, skipping");
            }
            fresh
        })
        .collect()
}

fn rwset_map(rwsets: Vec<TxRwSet>) -> HashMap<String, TxRwSet> {
    rwsets.into_iter().map(|r| (r.tx_id.clone(), r)).collect()
}

#[async_trait]
impl TransactionSchedulerApi for TxScheduler {
    async fn schedule(
        &self,
        block: &mut Block,
        txs: Vec<Transaction>,
        snapshot: Arc<dyn Snapshot>,
    ) -> Result<ScheduleOutput, SchedulerError> {
        let _guard = self.lock.lock().await;
        let halt_rx = self.arm_halt();
        let started = Instant::now();
        let pool = WorkerPool::new(self.config.effective_pool_capacity())?;
        let txs = Arc::new(dedupe(txs));
        let total = txs.len();
        info!(
            block_height = block.header.block_height,
            tx_count = total,
            "Schedule started"
        );

        let (worker, work_rx, finish_rx) =
            Worker::new(Arc::clone(&snapshot), Arc::clone(&self.vm), txs, &self.config, None);

        let exit = if total == 0 {
            snapshot.seal();
            LoopExit::Finished
        } else {
            self.drive(
                halt_rx,
                pool,
                worker,
                (0..total).collect(),
                work_rx,
                finish_rx,
                None,
                self.config.schedule_timeout,
            )
            .await
        };
        match exit {
            LoopExit::TimedOut => warn!(
                block_height = block.header.block_height,
                admitted = snapshot.snapshot_size(),
                total,
                "Schedule reached time limit"
            ),
            LoopExit::Halted => warn!(
                block_height = block.header.block_height,
                admitted = snapshot.snapshot_size(),
                total,
                "Schedule halted"
            ),
            LoopExit::Finished => {}
        }

        let main_round = Instant::now();
        block.dag = snapshot.build_dag(self.config.enable_sql_support);
        let specials = self.run_specials(&snapshot, block).await;
        block.txs = snapshot.tx_table();
        let specials = specials?;

        let rwsets = snapshot.tx_rwset_table();
        self.log_rwsets(&rwsets);
        if self.config.rwset_log {
            info!("{}", dump_dag(&block.dag, &block.txs));
        }

        let events = block
            .txs
            .iter()
            .filter_map(|tx| {
                let events = &tx.result.as_ref()?.contract_result.contract_events;
                (!events.is_empty()).then(|| (tx.tx_id().to_string(), events.clone()))
            })
            .collect();

        info!(
            block_height = block.header.block_height,
            admitted = block.txs.len(),
            specials,
            total,
            edges = block.dag.edge_count(),
            schedule_ms = main_round.duration_since(started).as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "Schedule finished"
        );

        Ok(ScheduleOutput {
            rwsets: rwset_map(rwsets),
            events,
        })
    }

    async fn simulate_with_dag(
        &self,
        block: &Block,
        snapshot: Arc<dyn Snapshot>,
    ) -> Result<ReplayOutput, SchedulerError> {
        let _guard = self.lock.lock().await;
        let halt_rx = self.arm_halt();
        let started = Instant::now();
        let total = block.txs.len();

        let pool = WorkerPool::new(self.config.effective_pool_capacity())?;
        let shape = validate_dag(&block.dag, total)?;
        info!(
            block_height = block.header.block_height,
            tx_count = total,
            dag_depth = shape.depth,
            max_parallelism = shape.max_parallelism,
            "Replay started"
        );

        if total == 0 {
            snapshot.seal();
            return Ok(ReplayOutput {
                rwsets: HashMap::new(),
                results: snapshot.tx_result_map(),
            });
        }

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (worker, work_rx, finish_rx) = Worker::new(
            Arc::clone(&snapshot),
            Arc::clone(&self.vm),
            Arc::new(block.txs.clone()),
            &self.config,
            Some(done_tx),
        );

        let mut remain = DagRemain::from_dag(&block.dag);
        let seed = remain.pop_ready();
        let exit = self
            .drive(
                halt_rx,
                pool,
                worker,
                seed,
                work_rx,
                finish_rx,
                Some((done_rx, remain)),
                self.config.replay_timeout,
            )
            .await;

        let admitted = snapshot.snapshot_size();
        match exit {
            LoopExit::Finished => {}
            LoopExit::TimedOut => {
                error!(
                    block_height = block.header.block_height,
                    admitted,
                    total,
                    "Replay reached time limit"
                );
                return Err(SchedulerError::ReplayTimeout { admitted, total });
            }
            LoopExit::Halted => {
                warn!(block_height = block.header.block_height, admitted, total, "Replay halted");
                return Err(SchedulerError::Halted { admitted, total });
            }
        }

        let rwsets = snapshot.tx_rwset_table();
        self.log_rwsets(&rwsets);
        info!(
            block_height = block.header.block_height,
            admitted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Replay finished"
        );

        Ok(ReplayOutput {
            rwsets: rwset_map(rwsets),
            results: snapshot.tx_result_map(),
        })
    }

    fn halt(&self) {
        self.halt_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_04_state_management::{MemoryStore, SnapshotImpl};
    use shared_types::protocol::CONTRACT_MANAGE;
    use shared_types::{
        AccessControlProvider, BlockHeader, Contract, ContractResult, Parameters, SpecialTxKind,
        TxSimContext, TxStatusCode, TxType,
    };

    /// Sleeps, then writes under the tx id.
    struct SleepVm;

    impl VmManager for SleepVm {
        fn run_contract(
            &self,
            contract: &Contract,
            _method: &str,
            _bytecode: &[u8],
            _parameters: &Parameters,
            ctx: &mut dyn TxSimContext,
            _gas_used: u64,
            _tx_type: TxType,
        ) -> (ContractResult, SpecialTxKind, TxStatusCode) {
            std::thread::sleep(Duration::from_millis(50));
            let key = ctx.tx().tx_id().as_bytes().to_vec();
            let _ = ctx.put(&contract.name, &key, b"1".to_vec());
            (ContractResult::ok(Vec::new()), SpecialTxKind::Normal, TxStatusCode::Success)
        }

        fn access_control(&self) -> Option<Arc<dyn AccessControlProvider>> {
            None
        }
    }

    fn make_config() -> SchedulerConfig {
        SchedulerConfig::default()
            .with_pool_capacity(1)
            .with_schedule_timeout(Duration::from_secs(10))
    }

    fn make_snapshot() -> Arc<dyn Snapshot> {
        let store = Arc::new(MemoryStore::new());
        store.put(CONTRACT_MANAGE, b"kv", bincode::serialize(&Contract::native("kv")).unwrap());
        Arc::new(SnapshotImpl::new(store, &BlockHeader::default()))
    }

    async fn drive_batch(scheduler: &TxScheduler, snapshot: &Arc<dyn Snapshot>, halt_rx: watch::Receiver<bool>, n: usize) -> LoopExit {
        let txs: Vec<_> = (0..n).map(|i| Transaction::new(format!("tx{i}"), "kv", "put")).collect();
        let (worker, work_rx, finish_rx) = Worker::new(
            Arc::clone(snapshot),
            Arc::clone(&scheduler.vm),
            Arc::new(txs),
            &scheduler.config,
            None,
        );
        scheduler
            .drive(
                halt_rx,
                WorkerPool::new(1).unwrap(),
                worker,
                (0..n).collect(),
                work_rx,
                finish_rx,
                None,
                scheduler.config.schedule_timeout,
            )
            .await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_halt_during_setup_is_kept() {
        let scheduler = TxScheduler::new(Arc::new(SleepVm), make_config());
        let snapshot = make_snapshot();

        // Halt lands after the call armed its watch but before the loop runs.
        let halt_rx = scheduler.arm_halt();
        scheduler.halt();
        let exit = drive_batch(&scheduler, &snapshot, halt_rx, 10).await;

        assert_eq!(exit, LoopExit::Halted);
        assert!(snapshot.is_sealed());
        assert_eq!(snapshot.snapshot_size(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_arming_clears_earlier_halt() {
        let scheduler = TxScheduler::new(Arc::new(SleepVm), make_config());
        let snapshot = make_snapshot();

        scheduler.halt();
        let halt_rx = scheduler.arm_halt();
        let exit = drive_batch(&scheduler, &snapshot, halt_rx, 3).await;

        assert_eq!(exit, LoopExit::Finished);
        assert_eq!(snapshot.snapshot_size(), 3);
    }
}
