//! User identity and persisted key schema.
//!
//! A [`UserId`] is the normalized phone number of one dialogue participant.
//! Every persisted record is keyed by a namespaced composite of a fixed
//! prefix and the identity, so session records, locks, and provider message
//! markers can never collide.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted length for a normalized identity.
pub const MAX_IDENTITY_LEN: usize = 20;

/// Key prefix for persisted session records.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Key prefix for per-identity mutation locks.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Key prefix for provider-level message-id markers.
pub const MESSAGE_MARKER_PREFIX: &str = "msg:";

/// Errors raised while normalizing a raw identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The raw identity contained no digits at all.
    #[error("identity contains no digits")]
    Empty,

    /// The normalized identity exceeds [`MAX_IDENTITY_LEN`].
    #[error("identity too long: {len} digits exceeds maximum {max}")]
    TooLong {
        /// Number of digits after normalization.
        len: usize,
        /// Maximum accepted digits.
        max: usize,
    },
}

/// Normalized user identity (phone number, digits only).
///
/// Construction strips every non-digit character, so `+52 1 (33) 1234-5678`
/// and `5213312345678` map to the same identity. The inner representation is
/// opaque to callers; use [`UserId::as_str`] for display and key building.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Normalizes a raw identity into a `UserId`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Empty`] if no digits remain after stripping,
    /// or [`IdentityError::TooLong`] if more than [`MAX_IDENTITY_LEN`] do.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(IdentityError::Empty);
        }
        if digits.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong {
                len: digits.len(),
                max: MAX_IDENTITY_LEN,
            });
        }
        Ok(Self(digits))
    }

    /// Returns the normalized identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which this identity's session record is persisted.
    #[must_use]
    pub fn session_key(&self) -> String {
        format!("{SESSION_KEY_PREFIX}{}", self.0)
    }

    /// Key under which this identity's mutation lock is held.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!("{LOCK_KEY_PREFIX}{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key under which a provider message id marker is persisted.
#[must_use]
pub fn message_marker_key(message_id: &str) -> String {
    format!("{MESSAGE_MARKER_PREFIX}{message_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_formatting() {
        let id = UserId::parse("+52 1 (33) 1234-5678").unwrap();
        assert_eq!(id.as_str(), "5213312345678");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(UserId::parse("hola"), Err(IdentityError::Empty));
        assert_eq!(UserId::parse(""), Err(IdentityError::Empty));
    }

    #[test]
    fn parse_rejects_overlong() {
        let raw = "1".repeat(MAX_IDENTITY_LEN + 1);
        assert!(matches!(
            UserId::parse(&raw),
            Err(IdentityError::TooLong { len: 21, max: 20 })
        ));
    }

    #[test]
    fn key_schema_is_prefixed() {
        let id = UserId::parse("5213312345678").unwrap();
        assert_eq!(id.session_key(), "session:5213312345678");
        assert_eq!(id.lock_key(), "lock:5213312345678");
        assert_eq!(message_marker_key("wamid.X"), "msg:wamid.X");
    }
}
