//! Per-version mutual exclusion for indexing
//!
//! Two index runs of the same version must not interleave their
//! delete/insert phases; runs on different versions proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Held while a version is being indexed; releases on drop
#[derive(Debug)]
pub struct VersionLockGuard {
    version_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl VersionLockGuard {
    pub fn version_id(&self) -> Uuid {
        self.version_id
    }
}

impl Drop for VersionLockGuard {
    fn drop(&mut self) {
        debug!(version_id = %self.version_id, "Released version lock");
    }
}

/// Registry of one async mutex per version id
#[derive(Debug, Clone)]
pub struct VersionLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
    timeout: Duration,
}

impl VersionLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait up to the configured timeout for exclusive access to a version
    pub async fn acquire(&self, version_id: Uuid) -> Result<VersionLockGuard> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on are only referenced by the map
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(version_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        debug!(version_id = %version_id, "Waiting for version lock");
        let guard = tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| Error::LockTimeout(version_id.to_string()))?;

        debug!(version_id = %version_id, "Acquired version lock");
        Ok(VersionLockGuard {
            version_id,
            _guard: guard,
        })
    }

    /// Whether a version is currently locked
    pub async fn is_locked(&self, version_id: Uuid) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(&version_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

impl Default for VersionLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let locks = VersionLocks::new(Duration::from_millis(100));
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await.unwrap();
        assert_eq!(guard.version_id(), id);
        assert!(locks.is_locked(id).await);

        drop(guard);
        assert!(!locks.is_locked(id).await);
        locks.acquire(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_version_times_out() {
        let locks = VersionLocks::new(Duration::from_millis(50));
        let id = Uuid::new_v4();

        let _held = locks.acquire(id).await.unwrap();
        let err = locks.acquire(id).await.unwrap_err();
        assert!(matches!(err, Error::LockTimeout(_)));
        assert_eq!(err.code(), "E300");
    }

    #[tokio::test]
    async fn test_different_versions_do_not_block() {
        let locks = VersionLocks::new(Duration::from_millis(50));
        let _a = locks.acquire(Uuid::new_v4()).await.unwrap();
        let _b = locks.acquire(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = VersionLocks::new(Duration::from_secs(5));
        let id = Uuid::new_v4();

        let held = locks.acquire(id).await.unwrap();
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await.map(|g| g.version_id()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let acquired = waiter.await.unwrap().unwrap();
        assert_eq!(acquired, id);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = VersionLocks::new(Duration::from_millis(50));
        for _ in 0..10 {
            let _guard = locks.acquire(Uuid::new_v4()).await.unwrap();
        }
        let _guard = locks.acquire(Uuid::new_v4()).await.unwrap();
        assert_eq!(locks.locks.lock().await.len(), 1);
    }
}
