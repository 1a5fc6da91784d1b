//! Bounded-retry wrapper over any store backend.

use std::time::Duration;

use async_trait::async_trait;
use permiso_core::backoff::BackoffPolicy;
use permiso_core::config::StoreConfig;
use tracing::warn;

use super::{KvStore, StoreError};

/// Wraps a [`KvStore`] with a small fixed number of attempts and a backoff
/// delay between them. After the attempts are exhausted the last error
/// propagates to the caller, which routes it into the error classifier.
#[derive(Debug)]
pub struct RetryStore<S> {
    inner: S,
    attempts: u32,
    backoff: BackoffPolicy,
}

impl<S: KvStore> RetryStore<S> {
    /// Wraps `inner` with the retry settings from `config`.
    #[must_use]
    pub fn new(inner: S, config: &StoreConfig) -> Self {
        Self {
            inner,
            attempts: config.attempts.max(1),
            backoff: config.backoff.clone(),
        }
    }

    /// Consumes the wrapper, returning the backend.
    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut last_err = None;
        for attempt in 1..=self.attempts {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(op, attempt, max = self.attempts, error = %err, "store operation failed");
                    last_err = Some(err);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                    }
                },
            }
        }
        Err(last_err.unwrap_or(StoreError::Backend {
            reason: "retry loop ran zero attempts".to_string(),
        }))
    }
}

#[async_trait]
impl<S: KvStore> KvStore for RetryStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.run("get", || self.inner.get(key)).await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.run("put", || self.inner.put(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.run("delete", || self.inner.delete(key)).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // Not retried: a retry after an ambiguous failure could observe its
        // own first write and report the key as taken.
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Backend that fails a configured number of times before succeeding.
    struct FlakyStore {
        failures_left: AtomicU32,
        inner: super::super::MemoryStore,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                inner: super::super::MemoryStore::new(),
            }
        }

        fn trip(&self) -> Result<(), StoreError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable {
                    reason: "ECONNREFUSED".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.trip()?;
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.put(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.trip()?;
            self.inner.delete(key).await
        }

        async fn put_if_absent(
            &self,
            key: &str,
            value: &[u8],
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.trip()?;
            self.inner.put_if_absent(key, value, ttl).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.trip()
        }
    }

    fn fast_config(attempts: u32) -> StoreConfig {
        StoreConfig {
            attempts,
            backoff: BackoffPolicy::Fixed {
                delay: Duration::from_millis(1),
            },
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn recovers_within_attempt_budget() {
        let store = RetryStore::new(FlakyStore::failing(2), &fast_config(3));
        store.put("k", b"v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn exhausted_attempts_return_the_last_error() {
        let store = RetryStore::new(FlakyStore::failing(10), &fast_config(3));
        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn put_if_absent_is_not_retried() {
        let store = RetryStore::new(FlakyStore::failing(1), &fast_config(3));
        assert!(store
            .put_if_absent("k", b"v", Duration::from_secs(60))
            .await
            .is_err());
    }
}
