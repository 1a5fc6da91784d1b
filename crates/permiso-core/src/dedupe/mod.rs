//! Duplicate message suppression over a short trailing window.
//!
//! The fingerprint covers `(identity, raw message, one-second bucket)`, so
//! only retransmits inside the same second are suppressed. This is a narrow
//! window by design: provider retries land within milliseconds, and general
//! idempotency is handled elsewhere (provider message-id markers with a long
//! TTL). The cache is bounded; when full it evicts in insertion order, and
//! expired entries are dropped opportunistically on every check plus in a
//! periodic [`DedupeCache::sweep`].

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::identity::UserId;

/// Fingerprint digest type.
type Fingerprint = [u8; 32];

/// Configuration for the dedupe cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DedupeConfig {
    /// Fingerprint bucket size in seconds.
    pub bucket_secs: u64,

    /// How long a fingerprint is retained, in seconds. A small multiple of
    /// the bucket size.
    pub window_secs: u64,

    /// Hard cap on cached fingerprints.
    pub max_entries: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            bucket_secs: 1,
            window_secs: 3,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Default)]
struct DedupeState {
    seen: HashMap<Fingerprint, u64>,
    order: VecDeque<(Fingerprint, u64)>,
}

/// Bounded fingerprint cache for duplicate suppression.
///
/// Thread-safe; checks take a read-modify cycle under an internal lock.
#[derive(Debug)]
pub struct DedupeCache {
    config: DedupeConfig,
    state: RwLock<DedupeState>,
}

impl DedupeCache {
    /// Creates a cache with the given configuration.
    #[must_use]
    pub fn new(config: DedupeConfig) -> Self {
        Self {
            config,
            state: RwLock::new(DedupeState::default()),
        }
    }

    fn fingerprint(&self, identity: &UserId, raw: &str, now_secs: u64) -> Fingerprint {
        let bucket = now_secs / self.config.bucket_secs.max(1);
        let mut hasher = Sha256::new();
        hasher.update(identity.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(raw.as_bytes());
        hasher.update([0]);
        hasher.update(bucket.to_be_bytes());
        hasher.finalize().into()
    }

    /// Returns `true` when the same `(identity, raw)` pair was already seen
    /// within the current one-second bucket; records it otherwise.
    pub fn is_duplicate(&self, identity: &UserId, raw: &str, now_secs: u64) -> bool {
        let fp = self.fingerprint(identity, raw, now_secs);
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        Self::evict_expired(&mut state, now_secs, self.config.window_secs);

        if state.seen.contains_key(&fp) {
            debug!(identity = %identity, "duplicate message suppressed");
            return true;
        }

        while state.seen.len() >= self.config.max_entries {
            match state.order.pop_front() {
                Some((old, _)) => {
                    state.seen.remove(&old);
                },
                None => break,
            }
        }

        state.seen.insert(fp, now_secs);
        state.order.push_back((fp, now_secs));
        false
    }

    /// Drops every entry older than the retention window. Intended for a
    /// periodic background task; checks also evict opportunistically.
    pub fn sweep(&self, now_secs: u64) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::evict_expired(&mut state, now_secs, self.config.window_secs);
    }

    /// Number of fingerprints currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .seen
            .len()
    }

    /// Returns `true` when no fingerprints are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(state: &mut DedupeState, now_secs: u64, window_secs: u64) {
        while let Some((fp, seen_at)) = state.order.front().copied() {
            if now_secs.saturating_sub(seen_at) <= window_secs {
                break;
            }
            state.order.pop_front();
            // Only drop the map entry if it still belongs to this insertion;
            // a re-inserted fingerprint carries a newer timestamp.
            if state.seen.get(&fp) == Some(&seen_at) {
                state.seen.remove(&fp);
            }
        }
    }
}
