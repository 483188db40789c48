//! Bounded pool for blocking VM executions.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

use crate::domain::errors::SchedulerError;

/// Runs at most `capacity` jobs at once on the blocking thread pool.
///
/// Jobs beyond capacity wait for a permit. Closing the pool drops every
/// job that has not started yet; running jobs finish on their own.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Result<Self, SchedulerError> {
        if capacity == 0 {
            return Err(SchedulerError::PoolCreation(
                "pool capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Queue `job`. Returns immediately.
    pub fn submit<F>(&self, job: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                error!(error = %e, "Worker job panicked");
            }
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently holding a permit.
    pub fn running(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Refuse every job still waiting for a permit.
    pub fn close(&self) {
        self.permits.close();
    }
}
