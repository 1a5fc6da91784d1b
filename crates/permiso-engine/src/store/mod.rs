//! Key-value store adapter.
//!
//! Every persisted byte in the engine goes through one [`KvStore`] trait:
//! opaque blobs keyed by namespaced strings, with expiry on every write and
//! an atomic create-if-absent primitive that the distributed lock builds on.
//! Two interchangeable backends implement it ([`MemoryStore`],
//! [`SqliteStore`]); [`RetryStore`] wraps either with bounded retries so
//! transient backend hiccups never reach the callers that can't handle them.

mod memory;
mod retry;
mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use retry::RetryStore;
pub use sqlite::SqliteStore;

/// Storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend answered with an error.
    #[error("store backend failure: {reason}")]
    Backend {
        /// Backend-level detail.
        reason: String,
    },

    /// The backend cannot be reached at all.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Transport-level detail.
        reason: String,
    },

    /// A value could not be encoded or decoded.
    #[error("store serialization failure: {reason}")]
    Serialization {
        /// Codec-level detail.
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend {
            reason: err.to_string(),
        }
    }
}

/// Retry-wrapped byte-blob storage with expiry.
///
/// Keys are opaque namespaced strings (see `permiso_core::identity`);
/// values are opaque blobs. Every write carries a TTL; expired entries
/// behave as absent on read and may be physically removed lazily.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a live value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value with a fresh TTL, replacing any prior value.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Deletes a value. Returns `true` when a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically writes a value with a TTL only when the key holds no live
    /// value. Returns `true` on creation. This is the locking primitive.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Checks reachability.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        (**self).put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        (**self).put_if_absent(key, value, ttl).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}
