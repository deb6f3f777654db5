use crate::error::{ApiError, Result};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

/// Per-account async mutexes serializing every balance mutation in this process.
///
/// Entries are created on demand and pruned once nobody holds or waits on them.
/// Cross-process exclusion comes from the row lock taken inside the transaction.
pub struct AccountLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    timeout: Duration,
}

/// Exclusive access to one account until dropped
pub struct AccountGuard {
    account_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Wait for exclusive access to `account_id`, failing closed after the timeout
    pub async fn acquire(&self, account_id: Uuid) -> Result<AccountGuard> {
        let lock = self.locks.entry(account_id).or_default().clone();

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(AccountGuard {
                account_id,
                guard: Some(guard),
                locks: self.locks.clone(),
            }),
            Err(_) => {
                prune(&self.locks, account_id);
                warn!(
                    account_id = %account_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Timed out waiting for account lock"
                );
                Err(ApiError::LockTimeout(account_id))
            }
        }
    }

    /// Number of accounts with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

impl AccountGuard {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference
        self.guard.take();
        prune(&self.locks, self.account_id);
    }
}

fn prune(locks: &DashMap<Uuid, Arc<Mutex<()>>>, account_id: Uuid) {
    locks.remove_if(&account_id, |_, lock| Arc::strong_count(lock) == 1);
}
