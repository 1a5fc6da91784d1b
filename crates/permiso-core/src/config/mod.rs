//! Engine configuration.
//!
//! One [`EngineConfig`] aggregates every tunable: session TTL, lock lease,
//! dedup window, rate quotas, store retries, and recovery thresholds.
//! Loadable from TOML; every field has a default so an empty document is a
//! valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::BackoffPolicy;
use crate::dedupe::DedupeConfig;
use crate::ratelimit::RateConfig;

/// Configuration parsing failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML did not parse or validate.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value was structurally valid but semantically wrong.
    #[error("invalid config: {reason}")]
    Validation {
        /// What was wrong.
        reason: String,
    },
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    /// Session TTL, reset in full on every save.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Per-identity lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LockConfig {
    /// Lease after which an abandoned lock self-heals.
    #[serde(with = "humantime_serde")]
    pub lease: Duration,

    /// Acquisition attempts before giving up.
    pub acquire_attempts: u32,

    /// Pause between acquisition attempts.
    #[serde(with = "humantime_serde")]
    pub acquire_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(5),
            acquire_attempts: 3,
            acquire_delay: Duration::from_millis(50),
        }
    }
}

/// Store retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreConfig {
    /// Attempts per operation (1 = no retry).
    pub attempts: u32,

    /// Delay policy between attempts.
    pub backoff: BackoffPolicy,

    /// TTL for provider message-id markers.
    #[serde(with = "humantime_serde")]
    pub message_marker_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffPolicy::default(),
            message_marker_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Recovery policy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RecoveryConfig {
    /// Failures within [`Self::failure_window`] before suspension.
    pub failure_threshold: u32,

    /// Trailing window for counting failures.
    #[serde(with = "humantime_serde")]
    pub failure_window: Duration,

    /// How long a suspension lasts.
    #[serde(with = "humantime_serde")]
    pub suspension: Duration,

    /// Hard cap on identities tracked in memory.
    pub max_tracked_identities: usize,

    /// Retry hint policy for store-failure recovery messages.
    pub retry_hint: BackoffPolicy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            failure_window: Duration::from_secs(60 * 60),
            suspension: Duration::from_secs(60 * 60),
            max_tracked_identities: 10_000,
            retry_hint: BackoffPolicy::Exponential {
                base: Duration::from_secs(60),
                factor: 2.0,
                cap: Duration::from_secs(30 * 60),
            },
        }
    }
}

/// Aggregated engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Session persistence settings.
    pub session: SessionConfig,
    /// Per-identity lock settings.
    pub lock: LockConfig,
    /// Store retry settings.
    pub store: StoreConfig,
    /// Duplicate suppression settings.
    pub dedupe: DedupeConfig,
    /// Rate limit quotas.
    pub rate: RateConfig,
    /// Recovery thresholds.
    pub recovery: RecoveryConfig,
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the TOML is invalid or a value fails
    /// validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.attempts == 0 {
            return Err(ConfigError::Validation {
                reason: "store.attempts must be at least 1".to_string(),
            });
        }
        if self.lock.acquire_attempts == 0 {
            return Err(ConfigError::Validation {
                reason: "lock.acquire_attempts must be at least 1".to_string(),
            });
        }
        if self.lock.lease.is_zero() {
            return Err(ConfigError::Validation {
                reason: "lock.lease must be positive".to_string(),
            });
        }
        Ok(())
    }
}
