//! # Node Configuration
//!
//! Scheduler settings plus the parameters of the generated workload.
//!
//! Defaults are overridden by `QC_*` environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QC_CHAIN_ID` | `chain_id` |
//! | `QC_POOL_CAPACITY` | `scheduler.pool_capacity` |
//! | `QC_SCHEDULE_TIMEOUT_MS` | `scheduler.schedule_timeout` |
//! | `QC_REPLAY_TIMEOUT_MS` | `scheduler.replay_timeout` |
//! | `QC_ENABLE_SQL` | `scheduler.enable_sql_support` |
//! | `QC_RWSET_LOG` | `scheduler.rwset_log` |
//! | `QC_TX_COUNT` | `workload.tx_count` |
//! | `QC_HOT_KEY_PERCENT` | `workload.hot_key_percent` |
//! | `QC_ROUNDS` | `rounds` |
//! | `QC_SEED` | `workload.seed` |

use std::str::FromStr;
use std::time::Duration;

use qc_12_transaction_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub chain_id: String,
    /// Blocks to propose and verify before exiting.
    pub rounds: u64,
    pub scheduler: SchedulerConfig,
    pub workload: WorkloadConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: "chain1".to_string(),
            rounds: 3,
            scheduler: SchedulerConfig::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

/// Shape of the generated transaction batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Transactions per block.
    pub tx_count: usize,
    /// Accounts funded at genesis.
    pub accounts: usize,
    /// Accounts every hot transfer draws from.
    pub hot_accounts: usize,
    /// Share of transfers touching a hot account (0..=100).
    pub hot_key_percent: u8,
    /// Initial balance of every account.
    pub initial_balance: u64,
    /// One config-change transaction every `config_every` transactions, 0 for none.
    pub config_every: usize,
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            tx_count: 1000,
            accounts: 200,
            hot_accounts: 4,
            hot_key_percent: 20,
            initial_balance: 1_000_000,
            config_every: 250,
            seed: 42,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value} is not a valid value")]
    InvalidValue { var: &'static str, value: String },

    #[error("hot key percent must be at most 100, got {0}")]
    HotKeyPercentOutOfRange(u8),

    #[error("at least {required} accounts are needed, got {actual}")]
    TooFewAccounts { required: usize, actual: usize },
}

impl NodeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `QC_*` variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut scheduler = config.scheduler.clone();

        if let Some(chain_id) = lookup("QC_CHAIN_ID") {
            config.chain_id = chain_id;
        }
        if let Some(rounds) = parse_var(&lookup, "QC_ROUNDS")? {
            config.rounds = rounds;
        }
        if let Some(capacity) = parse_var(&lookup, "QC_POOL_CAPACITY")? {
            scheduler = scheduler.with_pool_capacity(capacity);
        }
        if let Some(ms) = parse_var(&lookup, "QC_SCHEDULE_TIMEOUT_MS")? {
            scheduler = scheduler.with_schedule_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var(&lookup, "QC_REPLAY_TIMEOUT_MS")? {
            scheduler = scheduler.with_replay_timeout(Duration::from_millis(ms));
        }
        if let Some(enabled) = parse_var(&lookup, "QC_ENABLE_SQL")? {
            scheduler = scheduler.with_sql_support(enabled);
        }
        if let Some(enabled) = parse_var(&lookup, "QC_RWSET_LOG")? {
            scheduler = scheduler.with_rwset_log(enabled);
        }
        config.scheduler = scheduler;

        if let Some(count) = parse_var(&lookup, "QC_TX_COUNT")? {
            config.workload.tx_count = count;
        }
        if let Some(percent) = parse_var(&lookup, "QC_HOT_KEY_PERCENT")? {
            config.workload.hot_key_percent = percent;
        }
        if let Some(seed) = parse_var(&lookup, "QC_SEED")? {
            config.workload.seed = seed;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let workload = &self.workload;
        if workload.hot_key_percent > 100 {
            return Err(ConfigError::HotKeyPercentOutOfRange(workload.hot_key_percent));
        }
        // A transfer needs two distinct accounts from each pool.
        let required = workload.hot_accounts.max(2);
        if workload.accounts < required {
            return Err(ConfigError::TooFewAccounts {
                required,
                actual: workload.accounts,
            });
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
