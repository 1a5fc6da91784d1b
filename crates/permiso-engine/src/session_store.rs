//! Domain-level session persistence.
//!
//! Wraps the key-value store with the session contract: `load` never fails
//! the caller (any backend or decode problem yields a fresh idle session),
//! `save` always writes the complete session and resets the full TTL, and
//! `clear` is best-effort. The read-modify-write helpers are not atomic
//! against concurrent callers; correctness for one identity comes from the
//! caller holding that identity's lock around the sequence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use permiso_core::config::SessionConfig;
use permiso_core::fields::FieldKey;
use permiso_core::identity::UserId;
use permiso_core::session::Session;
use tracing::{debug, warn};

use crate::store::{KvStore, StoreError};

/// Session load/save/clear over a [`KvStore`].
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SessionStore {
    /// Creates a session store with the given TTL settings.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            ttl: config.ttl,
        }
    }

    /// Loads the session for `identity`, or a fresh idle one.
    ///
    /// Never fails the caller: a backend error is logged and yields a fresh
    /// session; a malformed record (unknown state type, torn write) is
    /// deleted best-effort and likewise yields a fresh session.
    pub async fn load(&self, identity: &UserId) -> Session {
        let key = identity.session_key();
        match self.store.get(&key).await {
            Ok(Some(blob)) => match serde_json::from_slice::<Session>(&blob) {
                Ok(session) => session,
                Err(err) => {
                    warn!(identity = %identity, error = %err, "invalid session record, recreating");
                    if let Err(err) = self.store.delete(&key).await {
                        warn!(identity = %identity, error = %err, "failed to delete invalid record");
                    }
                    Session::new(identity.clone(), Utc::now())
                },
            },
            Ok(None) => Session::new(identity.clone(), Utc::now()),
            Err(err) => {
                warn!(identity = %identity, error = %err, "session load failed, starting fresh");
                Session::new(identity.clone(), Utc::now())
            },
        }
    }

    /// Persists the complete session, refreshing its activity timestamp and
    /// resetting the full TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when encoding or the backend write fails.
    pub async fn save(&self, session: &mut Session) -> Result<(), StoreError> {
        session.touch(Utc::now());
        let blob = serde_json::to_vec(session).map_err(|err| StoreError::Serialization {
            reason: err.to_string(),
        })?;
        self.store
            .put(&session.identity.session_key(), &blob, self.ttl)
            .await
    }

    /// Best-effort delete of the session record. Failures are logged, not
    /// raised: clearing is not safety-critical.
    pub async fn clear(&self, identity: &UserId) {
        match self.store.delete(&identity.session_key()).await {
            Ok(removed) => debug!(identity = %identity, removed, "session cleared"),
            Err(err) => warn!(identity = %identity, error = %err, "session clear failed"),
        }
    }

    /// Stores one field value. Caller must hold the identity lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write-back fails.
    pub async fn set_field(
        &self,
        identity: &UserId,
        field: FieldKey,
        value: impl Into<String> + Send,
    ) -> Result<(), StoreError> {
        let mut session = self.load(identity).await;
        session.set_field(field, value);
        self.save(&mut session).await
    }

    /// Marks one field completed. Caller must hold the identity lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write-back fails.
    pub async fn mark_completed(
        &self,
        identity: &UserId,
        field: FieldKey,
    ) -> Result<(), StoreError> {
        let mut session = self.load(identity).await;
        session.mark_completed(field);
        self.save(&mut session).await
    }

    /// Increments and returns the rejected-attempt count for one field.
    /// Caller must hold the identity lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write-back fails.
    pub async fn record_attempt(
        &self,
        identity: &UserId,
        field: FieldKey,
    ) -> Result<u32, StoreError> {
        let mut session = self.load(identity).await;
        let count = session.record_attempt(field);
        self.save(&mut session).await?;
        Ok(count)
    }
}
