//! Retry backoff policies.
//!
//! Shared by the store retry wrapper (linear) and the store-failure recovery
//! script, which tells the user when to try again (exponential, capped).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay selection between retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay every attempt.
    Fixed {
        /// Delay duration.
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },

    /// Delay grows by a fixed step per attempt.
    Linear {
        /// Delay before the first retry.
        #[serde(with = "humantime_serde")]
        base: Duration,

        /// Added per further attempt.
        #[serde(with = "humantime_serde")]
        step: Duration,

        /// Upper bound.
        #[serde(with = "humantime_serde")]
        cap: Duration,
    },

    /// Delay doubles (by `factor`) per attempt.
    Exponential {
        /// Delay before the first retry.
        #[serde(with = "humantime_serde")]
        base: Duration,

        /// Multiplier per further attempt.
        #[serde(default = "default_factor")]
        factor: f64,

        /// Upper bound.
        #[serde(with = "humantime_serde")]
        cap: Duration,
    },
}

const fn default_factor() -> f64 {
    2.0
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Linear {
            base: Duration::from_millis(200),
            step: Duration::from_millis(200),
            cap: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Fixed { delay } => *delay,
            Self::Linear { base, step, cap } => {
                let delay = *base + *step * (attempt - 1);
                delay.min(*cap)
            },
            Self::Exponential { base, factor, cap } => {
                #[allow(clippy::cast_possible_wrap)] // attempt counts stay tiny
                let secs = base.as_secs_f64() * factor.powi((attempt - 1) as i32);
                Duration::from_secs_f64(secs).min(*cap)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_constant() {
        let p = BackoffPolicy::Fixed {
            delay: Duration::from_secs(1),
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(9), Duration::from_secs(1));
    }

    #[test]
    fn linear_grows_and_caps() {
        let p = BackoffPolicy::Linear {
            base: Duration::from_millis(100),
            step: Duration::from_millis(100),
            cap: Duration::from_millis(350),
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(p.delay_for_attempt(10), Duration::from_millis(350));
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let p = BackoffPolicy::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(5),
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(4), Duration::from_secs(5));
    }

    #[test]
    fn attempt_zero_is_treated_as_one() {
        let p = BackoffPolicy::default();
        assert_eq!(p.delay_for_attempt(0), p.delay_for_attempt(1));
    }
}
