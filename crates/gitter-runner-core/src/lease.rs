//! Per-pull-request serialization of verify/run phases.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::PullRequestRef;

/// Held for the duration of one phase on one pull request.
pub type PullRequestLease = OwnedMutexGuard<()>;

/// Async lock map keyed by pull request.
///
/// Phases for different pull requests run concurrently; phases for the
/// same pull request run one after another in arrival order.
#[derive(Debug, Default)]
pub struct PullRequestLeases {
    locks: Mutex<HashMap<PullRequestRef, Arc<AsyncMutex<()>>>>,
}

impl PullRequestLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lease on `pull_request`.
    pub async fn acquire(&self, pull_request: &PullRequestRef) -> PullRequestLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop idle entries; only the map itself still references them.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(pull_request.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of pull requests with a lease held or awaited.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|lock| Arc::strong_count(lock) > 1).count()
    }
}
