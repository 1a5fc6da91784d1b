//! In-memory store backend.
//!
//! The fallback used when no persistent backend is configured (and in
//! tests). Same contract as the persistent backend: per-entry expiry, an
//! atomic create-if-absent, and a hard cap with oldest-first eviction so an
//! unreachable-backend episode can never grow the process without bound.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{KvStore, StoreError};

/// Default cap on stored entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Entry>,
    // Insertion order for cap eviction; may contain ghost keys for entries
    // replaced or removed since, skipped via timestamp comparison.
    order: VecDeque<(String, Instant)>,
}

/// Bounded in-memory [`KvStore`].
#[derive(Debug)]
pub struct MemoryStore {
    max_entries: usize,
    state: RwLock<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store with the default entry cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Creates a store with a custom entry cap.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        state.entries.values().filter(|e| e.expires_at > now).count()
    }

    /// Returns `true` when no live entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_to_cap(state: &mut MemoryState, max_entries: usize) {
        while state.entries.len() >= max_entries {
            let Some((key, inserted_at)) = state.order.pop_front() else {
                break;
            };
            // Skip ghost entries re-inserted since this order record.
            let is_current = state
                .entries
                .get(&key)
                .is_some_and(|e| e.inserted_at == inserted_at);
            if is_current {
                debug!(key = %key, "evicting oldest in-memory entry at cap");
                state.entries.remove(&key);
            }
        }
    }

    fn insert(state: &mut MemoryState, key: &str, value: &[u8], ttl: Duration, now: Instant) {
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: now + ttl,
                inserted_at: now,
            },
        );
        state.order.push_back((key.to_string(), now));
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        match state.entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                state.entries.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        if !state.entries.contains_key(key) {
            Self::evict_to_cap(&mut state, self.max_entries);
        }
        Self::insert(&mut state, key, value, ttl, now);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        match state.entries.remove(key) {
            Some(entry) => Ok(entry.expires_at > now),
            None => Ok(false),
        }
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        let live = state
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > now);
        if live {
            return Ok(false);
        }
        if !state.entries.contains_key(key) {
            Self::evict_to_cap(&mut state, self.max_entries);
        }
        Self::insert(&mut state, key, value, ttl, now);
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryStore::new();
        store.put("k", b"v", TTL).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemoryStore::new();
        store.put("k", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_if_absent_is_exclusive_until_expiry() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("k", b"a", TTL).await.unwrap());
        assert!(!store.put_if_absent("k", b"b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn put_if_absent_succeeds_over_expired_entry() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("k", b"a", Duration::ZERO).await.unwrap());
        assert!(store.put_if_absent("k", b"b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn delete_reports_liveness() {
        let store = MemoryStore::new();
        store.put("k", b"v", TTL).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn cap_evicts_oldest_entries_first() {
        let store = MemoryStore::with_max_entries(3);
        for i in 0..5 {
            store.put(&format!("k{i}"), b"v", TTL).await.unwrap();
        }
        assert!(store.len() <= 3);
        assert_eq!(store.get("k0").await.unwrap(), None);
        assert_eq!(store.get("k4").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn overwriting_a_key_does_not_trigger_eviction() {
        let store = MemoryStore::with_max_entries(2);
        store.put("a", b"1", TTL).await.unwrap();
        store.put("b", b"2", TTL).await.unwrap();
        store.put("a", b"3", TTL).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.get("b").await.unwrap(), Some(b"2".to_vec()));
    }
}
