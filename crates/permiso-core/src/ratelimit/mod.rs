//! Multi-scope fixed-window rate limiting.
//!
//! Three independent quotas protect the system:
//! - per identity, hourly: the external messaging call quota;
//! - global, hourly: the whole system's outbound quota;
//! - per identity per dialogue state, per minute: rapid-resubmission abuse.
//!
//! Buckets are keyed by a structured [`Scope`] value plus the window index
//! computed from it; keys are never encoded into strings and parsed back.
//! The map is bounded with a hard cap on tracked scopes and pruned of
//! expired buckets on a periodic counter, mirroring the memory discipline
//! of the rest of the in-process caches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::identity::UserId;
use crate::session::DialogueState;

/// Quota configuration for the three scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateConfig {
    /// Requests allowed per identity per hour.
    pub per_identity_hourly: u32,

    /// Requests allowed globally per hour.
    pub global_hourly: u32,

    /// Requests allowed per identity per dialogue state per minute.
    pub per_state_per_minute: u32,

    /// Hard cap on tracked scope keys.
    pub max_tracked_scopes: usize,

    /// Prune expired buckets every N checks.
    pub prune_interval: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            per_identity_hourly: 100,
            global_hourly: 1_000,
            per_state_per_minute: 10,
            max_tracked_scopes: 10_000,
            prune_interval: 256,
        }
    }
}

/// One rate-limited scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The whole system.
    Global,
    /// One identity across all states.
    Identity(UserId),
    /// One identity within one dialogue state.
    IdentityState(UserId, DialogueState),
}

impl Scope {
    /// Window size for this scope, in seconds.
    #[must_use]
    pub const fn window_secs(&self) -> u64 {
        match self {
            Self::Global | Self::Identity(_) => 3_600,
            Self::IdentityState(..) => 60,
        }
    }

    fn budget(&self, config: &RateConfig) -> u32 {
        match self {
            Self::Global => config.global_hourly,
            Self::Identity(_) => config.per_identity_hourly,
            Self::IdentityState(..) => config.per_state_per_minute,
        }
    }
}

/// Outcome of consuming one point from a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Within budget; the point was charged.
    Allowed,
    /// Budget exhausted for the current window.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

impl Decision {
    /// Returns `true` for [`Decision::Allowed`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_index: u64,
    window_secs: u64,
    count: u32,
}

/// Fixed-window rate limiter over structured scope keys.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateConfig,
    buckets: RwLock<HashMap<Scope, Bucket>>,
    check_count: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter with the given quotas.
    #[must_use]
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
            check_count: AtomicU64::new(0),
        }
    }

    /// Charges one point against `scope` at time `now_secs`.
    ///
    /// The bucket is always incremented; the charge is rejected when the
    /// increment exceeds the scope's budget, and the caller learns how long
    /// until the window resets.
    pub fn check(&self, scope: Scope, now_secs: u64) -> Decision {
        let count = self.check_count.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % self.config.prune_interval.max(1) == 0 {
            self.prune(now_secs);
        }

        let window = scope.window_secs();
        let window_index = now_secs / window;
        let budget = scope.budget(&self.config);

        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !buckets.contains_key(&scope) && buckets.len() >= self.config.max_tracked_scopes {
            Self::prune_locked(&mut buckets, now_secs);
            if buckets.len() >= self.config.max_tracked_scopes {
                warn!(
                    tracked = buckets.len(),
                    max = self.config.max_tracked_scopes,
                    "scope cap reached, rejecting untracked scope"
                );
                return Decision::Limited {
                    retry_after: Duration::from_secs(window),
                };
            }
        }

        let bucket = buckets.entry(scope).or_insert(Bucket {
            window_index,
            window_secs: window,
            count: 0,
        });
        if bucket.window_index != window_index {
            bucket.window_index = window_index;
            bucket.count = 0;
        }
        bucket.count += 1;

        if bucket.count > budget {
            let reset_at = (window_index + 1) * window;
            let retry_after = Duration::from_secs(reset_at.saturating_sub(now_secs));
            debug!(count = bucket.count, budget, "rate limit exceeded");
            return Decision::Limited { retry_after };
        }
        Decision::Allowed
    }

    /// Drops buckets whose window has passed.
    pub fn prune(&self, now_secs: u64) {
        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::prune_locked(&mut buckets, now_secs);
    }

    fn prune_locked(buckets: &mut HashMap<Scope, Bucket>, now_secs: u64) {
        buckets.retain(|_, b| b.window_index >= now_secs / b.window_secs);
    }

    /// Number of scopes currently tracked.
    #[must_use]
    pub fn tracked_scopes(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
