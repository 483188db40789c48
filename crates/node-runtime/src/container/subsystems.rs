//! # Node Container
//!
//! Holds the store, the contract runtime and both schedulers.
//!
//! ```text
//! Genesis ──→ MemoryStore ←──read_object── SnapshotImpl (one per block, per role)
//!                                                ↑
//!                     proposer: TxScheduler ─────┤ discover mode
//!                     verifier: TxScheduler ─────┘ replay mode
//!                                ↓
//!                              KvVm
//! ```
//!
//! The proposer and verifier never share a snapshot: the verifier replays
//! the proposed block against a fresh one, as a remote validator would.

use std::sync::Arc;

use qc_04_state_management::MemoryStore;
use qc_12_transaction_scheduler::TxScheduler;
use shared_types::VmManager;
use tracing::{info, instrument};

use crate::adapters::KvVm;
use crate::container::config::NodeConfig;
use crate::genesis::{GenesisBuilder, GenesisConfig, GenesisError, GenesisState};

pub struct NodeContainer {
    pub config: NodeConfig,
    pub store: Arc<MemoryStore>,
    pub vm: Arc<dyn VmManager>,
    /// Schedules proposed blocks.
    pub proposer: TxScheduler,
    /// Replays proposed blocks along their DAG.
    pub verifier: TxScheduler,
    pub genesis: GenesisState,
}

impl NodeContainer {
    /// Wire every component and write genesis state.
    #[instrument(skip(config), fields(chain_id = %config.chain_id))]
    pub fn new(config: NodeConfig) -> Result<Self, GenesisError> {
        let store = Arc::new(MemoryStore::new());
        let genesis = GenesisBuilder::new(GenesisConfig {
            accounts: config.workload.accounts,
            initial_balance: config.workload.initial_balance,
            ..GenesisConfig::default()
        })
        .build(&store)?;

        let vm: Arc<dyn VmManager> = Arc::new(KvVm::new());
        let proposer = TxScheduler::new(Arc::clone(&vm), config.scheduler.clone());
        let verifier = TxScheduler::new(Arc::clone(&vm), config.scheduler.clone());

        info!(
            pool_capacity = config.scheduler.effective_pool_capacity(),
            sql = config.scheduler.enable_sql_support,
            "Node container initialized"
        );

        Ok(Self {
            config,
            store,
            vm,
            proposer,
            verifier,
            genesis,
        })
    }
}
