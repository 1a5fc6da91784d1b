//! Per-identity distributed lock.
//!
//! Mutual exclusion for the session read-modify-write cycle, built on the
//! store's atomic create-if-absent with a bounded lease. A holder that
//! crashes mid-cycle self-heals when the lease expires. Release is
//! owner-checked: a token that no longer matches the stored one (the lease
//! expired and someone newer acquired) releases nothing.
//!
//! Locks are never held across the extraction collaborator call; only
//! around the session read-modify-write.

use std::sync::Arc;

use permiso_core::config::LockConfig;
use permiso_core::identity::UserId;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{KvStore, StoreError};

/// Proof of lock ownership for one identity.
///
/// Not `Clone`: exactly one guard exists per successful acquisition, and
/// releasing consumes it.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    /// The owner token, for diagnostics.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Acquires and releases per-identity locks against the store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KvStore>,
    config: LockConfig,
}

impl LockManager {
    /// Creates a manager over `store` with the given lease settings.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Tries to acquire the lock for `identity`.
    ///
    /// Pings the backend first: an unreachable backend means no mutual
    /// exclusion is possible, so the acquisition fails rather than pretends.
    /// A handful of short retries absorb a just-releasing previous holder;
    /// `None` after that means somebody else is actively working on this
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be reached or the
    /// atomic create fails.
    pub async fn acquire(&self, identity: &UserId) -> Result<Option<LockGuard>, StoreError> {
        self.store.ping().await?;
        let key = identity.lock_key();
        let token = Uuid::new_v4().to_string();
        for attempt in 1..=self.config.acquire_attempts {
            let created = self
                .store
                .put_if_absent(&key, token.as_bytes(), self.config.lease)
                .await?;
            if created {
                debug!(identity = %identity, attempt, "lock acquired");
                return Ok(Some(LockGuard { key, token }));
            }
            if attempt < self.config.acquire_attempts {
                tokio::time::sleep(self.config.acquire_delay).await;
            }
        }
        debug!(identity = %identity, "lock busy after retries");
        Ok(None)
    }

    /// Releases a held lock.
    ///
    /// Only deletes the stored entry when it still carries this guard's
    /// token. Returns `true` when the lock was actually released.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend fails; the lease still
    /// expires the lock on its own in that case.
    pub async fn release(&self, guard: LockGuard) -> Result<bool, StoreError> {
        match self.store.get(&guard.key).await? {
            Some(stored) if stored == guard.token.as_bytes() => {
                self.store.delete(&guard.key).await
            },
            Some(_) => {
                warn!(key = %guard.key, "lock owned by a newer holder, not released");
                Ok(false)
            },
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    fn manager(store: Arc<dyn KvStore>) -> LockManager {
        LockManager::new(
            store,
            LockConfig {
                lease: Duration::from_secs(5),
                acquire_attempts: 2,
                acquire_delay: Duration::from_millis(1),
            },
        )
    }

    fn identity() -> UserId {
        UserId::parse("5210000000010").unwrap()
    }

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store);
        let guard = locks.acquire(&identity()).await.unwrap();
        assert!(guard.is_some());
        assert!(locks.acquire(&identity()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_then_reacquire() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store);
        let guard = locks.acquire(&identity()).await.unwrap().unwrap();
        assert!(locks.release(guard).await.unwrap());
        assert!(locks.acquire(&identity()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_is_owner_checked() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(Arc::clone(&store));

        let stale = locks.acquire(&identity()).await.unwrap().unwrap();
        // Simulate lease expiry plus re-acquisition by a newer holder.
        store.delete(&identity().lock_key()).await.unwrap();
        let fresh = locks.acquire(&identity()).await.unwrap().unwrap();

        // The stale guard must not release the newer holder's lock.
        assert!(!locks.release(stale).await.unwrap());
        assert!(locks.acquire(&identity()).await.unwrap().is_none());
        assert!(locks.release(fresh).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_acquires_grant_exactly_one() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let locks = manager(store);
        let id = identity();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let id = id.clone();
                tokio::spawn(async move { locks.acquire(&id).await.unwrap().is_some() })
            })
            .collect();

        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }
}
