//! Failure taxonomy and classification.
//!
//! Every recoverable failure in the engine maps to one [`ErrorKind`]; the
//! recovery policy selects its script from the kind alone. Classification is
//! deliberately forgiving: it pattern-matches failure text (including the
//! source chain) and anything unrecognized becomes
//! [`ErrorKind::ProcessingError`], the catch-all.
//!
//! [`InvalidStateError`](crate::session::InvalidStateError) is *not* part of
//! this taxonomy: an invalid type/context pairing is a programmer error and
//! must surface, never be recovered around.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of recoverable failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The persisted session no longer makes sense and must be rebuilt.
    CorruptedState,
    /// The backing store (or another backend) failed or is unreachable.
    StoreFailure,
    /// User input failed field validation.
    ValidationError,
    /// A rate-limit quota was exhausted.
    RateLimitExceeded,
    /// Anything else; the default.
    ProcessingError,
}

impl ErrorKind {
    /// All kinds, for table checks.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::CorruptedState,
            Self::StoreFailure,
            Self::ValidationError,
            Self::RateLimitExceeded,
            Self::ProcessingError,
        ]
    }

    /// Stable name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CorruptedState => "corrupted_state",
            Self::StoreFailure => "store_failure",
            Self::ValidationError => "validation_error",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const STORE_PATTERNS: &[&str] = &[
    "econnrefused",
    "etimedout",
    "connection refused",
    "connection reset",
    "broken pipe",
    "timed out",
    "sqlite",
    "database",
    "storage",
    "store",
    "unavailable",
];

const RATE_PATTERNS: &[&str] = &["rate limit", "too many requests", "quota"];

const CORRUPTION_PATTERNS: &[&str] = &[
    "corrupt",
    "invalid state",
    "malformed",
    "deserialization",
    "unknown variant",
];

const VALIDATION_PATTERNS: &[&str] = &["validation", "invalid input", "not valid", "rejected"];

/// Classifies failure text into a kind.
///
/// Matching is case-insensitive substring search, checked in order of
/// specificity; unmatched text is [`ErrorKind::ProcessingError`].
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    let text = message.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| text.contains(p));
    if matches(RATE_PATTERNS) {
        ErrorKind::RateLimitExceeded
    } else if matches(CORRUPTION_PATTERNS) {
        ErrorKind::CorruptedState
    } else if matches(STORE_PATTERNS) {
        ErrorKind::StoreFailure
    } else if matches(VALIDATION_PATTERNS) {
        ErrorKind::ValidationError
    } else {
        ErrorKind::ProcessingError
    }
}

/// Classifies an error value, including its source chain.
#[must_use]
pub fn classify(error: &(dyn std::error::Error + 'static)) -> ErrorKind {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push('\n');
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    classify_message(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_refused_is_a_store_failure() {
        assert_eq!(
            classify_message("redis ping failed: ECONNREFUSED 127.0.0.1:6379"),
            ErrorKind::StoreFailure
        );
    }

    #[test]
    fn rate_limit_text_wins_over_other_patterns() {
        assert_eq!(
            classify_message("store rejected request: rate limit exceeded"),
            ErrorKind::RateLimitExceeded
        );
    }

    #[test]
    fn corruption_beats_validation() {
        assert_eq!(
            classify_message("invalid state in persisted record"),
            ErrorKind::CorruptedState
        );
        assert_eq!(
            classify_message("field validation failed"),
            ErrorKind::ValidationError
        );
    }

    #[test]
    fn unknown_text_defaults_to_processing_error() {
        assert_eq!(classify_message("something odd"), ErrorKind::ProcessingError);
        assert_eq!(classify_message(""), ErrorKind::ProcessingError);
    }

    #[test]
    fn classify_walks_the_source_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer failure")]
        struct Outer {
            #[source]
            inner: std::io::Error,
        }

        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "ECONNREFUSED"),
        };
        assert_eq!(classify(&err), ErrorKind::StoreFailure);
    }
}
