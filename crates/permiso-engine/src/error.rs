//! Engine-level error type.
//!
//! One enum covers every recoverable failure the pipeline can hit; its
//! [`EngineError::kind`] maps directly onto the failure taxonomy the
//! recovery policy scripts against. `InvalidStateError` deliberately has no
//! variant here: an invalid type/context pairing is fatal and must not be
//! routed through recovery.

use std::time::Duration;

use permiso_core::error::ErrorKind;
use permiso_core::validate::FieldError;
use thiserror::Error;

use crate::outbound::SendError;
use crate::store::StoreError;

/// A recoverable engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The persisted session no longer makes sense.
    #[error("corrupted session state: {reason}")]
    CorruptedState {
        /// What was wrong with the record.
        reason: String,
    },

    /// The backing store failed after retries.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// User input failed field validation.
    #[error(transparent)]
    Validation(#[from] FieldError),

    /// A rate-limit quota was exhausted.
    #[error("rate limit exceeded, window resets in {retry_after:?}")]
    RateLimited {
        /// Time until the window resets.
        retry_after: Duration,
    },

    /// Message delivery failed.
    #[error(transparent)]
    Delivery(#[from] SendError),

    /// Anything else.
    #[error("processing failed: {reason}")]
    Processing {
        /// What went wrong.
        reason: String,
    },
}

impl EngineError {
    /// Maps the failure onto the recovery taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CorruptedState { .. } => ErrorKind::CorruptedState,
            Self::Store(_) => ErrorKind::StoreFailure,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::RateLimited { .. } => ErrorKind::RateLimitExceeded,
            Self::Delivery(_) | Self::Processing { .. } => ErrorKind::ProcessingError,
        }
    }
}

#[cfg(test)]
mod tests {
    use permiso_core::fields::FieldKey;

    use super::*;

    #[test]
    fn kinds_map_onto_the_taxonomy() {
        let store = EngineError::Store(StoreError::Unavailable {
            reason: "ECONNREFUSED".to_string(),
        });
        assert_eq!(store.kind(), ErrorKind::StoreFailure);

        let validation = EngineError::Validation(FieldError::Empty {
            field: FieldKey::Color,
        });
        assert_eq!(validation.kind(), ErrorKind::ValidationError);

        let limited = EngineError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(limited.kind(), ErrorKind::RateLimitExceeded);
    }

    #[test]
    fn classifier_agrees_with_store_failure_kind() {
        let err = EngineError::Store(StoreError::Unavailable {
            reason: "connect ECONNREFUSED 127.0.0.1:6379".to_string(),
        });
        assert_eq!(permiso_core::error::classify(&err), err.kind());
    }
}
