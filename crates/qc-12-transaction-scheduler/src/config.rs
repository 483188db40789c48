//! Configuration for the Transaction Scheduler

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default discover-mode budget.
pub const SCHEDULE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default replay budget. Longer than discover mode to give verifiers grace.
pub const SCHEDULE_WITH_DAG_TIMEOUT: Duration = Duration::from_secs(20);

/// Scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent executions per call
    pub pool_capacity: usize,
    /// Discover-mode budget; partial results are returned when it elapses
    pub schedule_timeout: Duration,
    /// Replay budget; the block is rejected when it elapses
    pub replay_timeout: Duration,
    /// Contract state lives in a SQL engine that needs serialized mutation
    pub enable_sql_support: bool,
    /// Log every admitted RW set at debug level
    pub rwset_log: bool,
    /// Pause before resubmitting a conflict-rejected execution
    pub retry_backoff: Option<Duration>,
}

impl SchedulerConfig {
    /// Pool size actually used: SQL-backed state forces a single worker.
    pub fn effective_pool_capacity(&self) -> usize {
        if self.enable_sql_support {
            1
        } else {
            self.pool_capacity
        }
    }

    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    pub fn with_schedule_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_timeout = timeout;
        self
    }

    pub fn with_replay_timeout(mut self, timeout: Duration) -> Self {
        self.replay_timeout = timeout;
        self
    }

    pub fn with_sql_support(mut self, enabled: bool) -> Self {
        self.enable_sql_support = enabled;
        self
    }

    pub fn with_rwset_log(mut self, enabled: bool) -> Self {
        self.rwset_log = enabled;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Option<Duration>) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_capacity: num_cpus::get() * 4,
            schedule_timeout: SCHEDULE_TIMEOUT,
            replay_timeout: SCHEDULE_WITH_DAG_TIMEOUT,
            enable_sql_support: false,
            rwset_log: false,
            retry_backoff: None,
        }
    }
}
