//! Error recovery policy.
//!
//! Every classified failure lands here. The policy tracks per-identity
//! failure frequency over a trailing window and suspends identities that
//! exceed the threshold (a deliberate, user-visible state with a stated
//! duration, not a silent drop). Below the threshold it dispatches a
//! per-kind recovery script: a short tracking id, a plain-language
//! explanation, and one to three numbered next actions. If a recovery
//! script itself fails (persistence down, say), a last-resort direct send
//! bypasses the session store and the rate limiter entirely.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use permiso_core::config::RecoveryConfig;
use permiso_core::error::ErrorKind;
use permiso_core::identity::UserId;
use permiso_core::session::{DialogueState, ErrorContext, Session};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::outbound::{MessageSink, OutboundMessage};
use crate::session_store::SessionStore;

/// Read-only snapshot of the recovery policy's state, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Identities with at least one tracked failure.
    pub tracked_identities: usize,
    /// Failures within the trailing window, across identities.
    pub recent_failures: usize,
    /// Identities currently suspended.
    pub suspended_identities: usize,
}

/// What the policy did with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// A recovery message was sent.
    Replied,
    /// The identity is suspended; nothing was sent.
    Suppressed,
}

#[derive(Debug, Default)]
struct FailureRecord {
    times: VecDeque<Instant>,
    suspended_until: Option<Instant>,
}

enum Disposition {
    Proceed,
    JustSuspended,
    Suspended,
}

/// Failure frequency tracking plus per-kind recovery scripts.
pub struct RecoveryPolicy {
    config: RecoveryConfig,
    sessions: SessionStore,
    sink: Arc<dyn MessageSink>,
    failures: Mutex<HashMap<UserId, FailureRecord>>,
}

impl RecoveryPolicy {
    /// Creates a policy delivering through `sink` and repairing sessions
    /// through `sessions`.
    #[must_use]
    pub fn new(config: RecoveryConfig, sessions: SessionStore, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            config,
            sessions,
            sink,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` while `identity` is suspended.
    #[must_use]
    pub fn is_suspended(&self, identity: &UserId) -> bool {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(record) = failures.get_mut(identity) else {
            return false;
        };
        match record.suspended_until {
            Some(until) if until > Instant::now() => true,
            Some(_) => {
                // Deadline passed: automatic un-suspension.
                record.suspended_until = None;
                false
            },
            None => false,
        }
    }

    /// Handles one classified failure for `identity`.
    ///
    /// Records the failure, suspends on threshold, otherwise runs the
    /// per-kind recovery script. Never returns an error: the last-resort
    /// path logs and gives up rather than failing the caller.
    pub async fn handle(&self, identity: &UserId, failure: &EngineError) -> RecoveryOutcome {
        let kind = failure.kind();
        let tracking = tracking_id();
        info!(identity = %identity, %kind, tracking = %tracking, error = %failure, "recovering from failure");

        match self.record_failure(identity) {
            Disposition::Suspended => return RecoveryOutcome::Suppressed,
            Disposition::JustSuspended => {
                let minutes = self.config.suspension.as_secs() / 60;
                let notice = OutboundMessage::text(format!(
                    "Hemos detectado demasiados intentos fallidos. Tu acceso queda \
                     pausado {minutes} minutos. Si necesitas ayuda escribe a soporte. \
                     (ref {tracking})"
                ));
                self.direct_send(identity, notice).await;
                return RecoveryOutcome::Replied;
            },
            Disposition::Proceed => {},
        }

        let message = match self.run_script(identity, failure, &tracking).await {
            Ok(message) => message,
            Err(err) => {
                // The recovery routine itself failed; fall back to the
                // last-resort path that touches nothing but the sink.
                error!(identity = %identity, error = %err, "recovery script failed");
                OutboundMessage::text(format!(
                    "Tenemos un problema técnico. Tu información está a salvo; \
                     intenta de nuevo en unos minutos. (ref {tracking})"
                ))
            },
        };
        self.direct_send(identity, message).await;
        RecoveryOutcome::Replied
    }

    /// Builds the per-kind recovery message, repairing state where needed.
    async fn run_script(
        &self,
        identity: &UserId,
        failure: &EngineError,
        tracking: &str,
    ) -> Result<OutboundMessage, EngineError> {
        match failure.kind() {
            ErrorKind::CorruptedState => {
                // The record is beyond repair: rebuild it in the recovery
                // context so the next reply picks one of the options below.
                self.sessions.clear(identity).await;
                let mut fresh = Session::new(identity.clone(), chrono::Utc::now());
                fresh.state = DialogueState::Error(ErrorContext::Recovery);
                self.sessions.save(&mut fresh).await?;
                Ok(OutboundMessage::prompt(
                    format!(
                        "Tu trámite tuvo un problema y no pudimos recuperar la \
                         sesión anterior. (ref {tracking})"
                    ),
                    vec![
                        "Recuperar mi información".to_string(),
                        "Empezar de nuevo".to_string(),
                        "Contactar soporte".to_string(),
                    ],
                ))
            },
            ErrorKind::StoreFailure => {
                let attempt = self.recent_failure_count(identity);
                let wait = self.config.retry_hint.delay_for_attempt(attempt);
                let minutes = (wait.as_secs() / 60).max(1);
                Ok(OutboundMessage::text(format!(
                    "Tu progreso está a salvo. Tenemos un problema temporal con el \
                     sistema; intenta de nuevo en unos {minutes} minutos. \
                     (ref {tracking})"
                )))
            },
            ErrorKind::ValidationError => {
                let (body, example) = match failure {
                    EngineError::Validation(field_error) => (
                        field_error.user_message(),
                        Some(field_error.field().example()),
                    ),
                    other => (other.to_string(), None),
                };
                let mut text = body;
                if let Some(example) = example {
                    text.push_str(&format!("\nEjemplo: {example}"));
                }
                text.push_str(&format!("\n(ref {tracking})"));
                Ok(OutboundMessage::prompt(
                    text,
                    vec![
                        "Ver más ejemplos".to_string(),
                        "Contactar soporte".to_string(),
                        "Intentar de nuevo".to_string(),
                    ],
                ))
            },
            ErrorKind::RateLimitExceeded => {
                let wait = match failure {
                    EngineError::RateLimited { retry_after } => *retry_after,
                    _ => Duration::from_secs(60),
                };
                let minutes = (wait.as_secs() / 60).max(1);
                Ok(OutboundMessage::text(format!(
                    "Has enviado muchos mensajes seguidos. Espera {minutes} \
                     minutos; mientras tanto puedes ir reuniendo tus documentos. \
                     (ref {tracking})"
                )))
            },
            ErrorKind::ProcessingError => Ok(OutboundMessage::prompt(
                format!(
                    "Algo salió mal de nuestro lado, una disculpa. (ref {tracking})"
                ),
                vec![
                    "Reintentar".to_string(),
                    "Continuar por otro medio".to_string(),
                    "Contactar soporte".to_string(),
                ],
            )),
        }
    }

    /// Last-resort delivery: nothing but the sink, failures only logged.
    async fn direct_send(&self, identity: &UserId, message: OutboundMessage) {
        if let Err(err) = self.sink.send(identity, message).await {
            error!(identity = %identity, error = %err, "last-resort send failed");
        }
    }

    fn record_failure(&self, identity: &UserId) -> Disposition {
        let now = Instant::now();
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if failures.len() >= self.config.max_tracked_identities
            && !failures.contains_key(identity)
        {
            Self::evict_idle(&mut failures, now, self.config.failure_window);
        }

        let record = failures.entry(identity.clone()).or_default();
        match record.suspended_until {
            Some(until) if until > now => return Disposition::Suspended,
            Some(_) => record.suspended_until = None,
            None => {},
        }

        record.times.push_back(now);
        while let Some(&front) = record.times.front() {
            if now.duration_since(front) > self.config.failure_window {
                record.times.pop_front();
            } else {
                break;
            }
        }

        if record.times.len() as u32 > self.config.failure_threshold {
            warn!(identity = %identity, count = record.times.len(), "failure threshold exceeded, suspending");
            record.suspended_until = Some(now + self.config.suspension);
            record.times.clear();
            return Disposition::JustSuspended;
        }
        Disposition::Proceed
    }

    fn recent_failure_count(&self, identity: &UserId) -> u32 {
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        failures
            .get(identity)
            .map_or(0, |r| u32::try_from(r.times.len()).unwrap_or(u32::MAX))
    }

    fn evict_idle(
        failures: &mut HashMap<UserId, FailureRecord>,
        now: Instant,
        window: Duration,
    ) {
        failures.retain(|_, record| {
            let suspended = record
                .suspended_until
                .is_some_and(|until| until > now);
            let recent = record
                .times
                .back()
                .is_some_and(|&t| now.duration_since(t) <= window);
            suspended || recent
        });
    }

    /// Read-only monitoring snapshot.
    #[must_use]
    pub fn statistics(&self) -> RecoveryStats {
        let now = Instant::now();
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        RecoveryStats {
            tracked_identities: failures.len(),
            recent_failures: failures.values().map(|r| r.times.len()).sum(),
            suspended_identities: failures
                .values()
                .filter(|r| r.suspended_until.is_some_and(|until| until > now))
                .count(),
        }
    }
}

fn tracking_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use permiso_core::config::SessionConfig;
    use permiso_core::fields::FieldKey;
    use permiso_core::validate::FieldError;

    use super::*;
    use crate::outbound::RecordingSink;
    use crate::store::{KvStore, MemoryStore};

    fn identity() -> UserId {
        UserId::parse("5210000000013").unwrap()
    }

    fn policy() -> (RecoveryPolicy, Arc<RecordingSink>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(store, &SessionConfig::default());
        let sink = Arc::new(RecordingSink::new());
        let policy = RecoveryPolicy::new(
            RecoveryConfig::default(),
            sessions,
            Arc::clone(&sink) as Arc<dyn MessageSink>,
        );
        (policy, sink)
    }

    fn validation_error() -> EngineError {
        EngineError::Validation(FieldError::Empty {
            field: FieldKey::Color,
        })
    }

    #[tokio::test]
    async fn validation_failure_gets_a_scripted_reply() {
        let (policy, sink) = policy();
        let outcome = policy.handle(&identity(), &validation_error()).await;
        assert_eq!(outcome, RecoveryOutcome::Replied);
        assert_eq!(sink.count(), 1);
        let rendered = sink.sent()[0].1.render();
        assert!(rendered.contains("(ref "));
        assert!(rendered.contains("1. "));
    }

    #[tokio::test]
    async fn corrupted_state_rebuilds_the_session_in_recovery_context() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(Arc::clone(&store), &SessionConfig::default());
        let sink = Arc::new(RecordingSink::new());
        let policy = RecoveryPolicy::new(
            RecoveryConfig::default(),
            sessions.clone(),
            Arc::clone(&sink) as Arc<dyn MessageSink>,
        );

        let failure = EngineError::CorruptedState {
            reason: "unknown state type".to_string(),
        };
        policy.handle(&identity(), &failure).await;

        let session = sessions.load(&identity()).await;
        assert_eq!(session.state, DialogueState::Error(ErrorContext::Recovery));
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn eleventh_failure_within_the_hour_suspends() {
        let (policy, sink) = policy();
        let id = identity();
        for _ in 0..10 {
            assert_eq!(
                policy.handle(&id, &validation_error()).await,
                RecoveryOutcome::Replied
            );
        }
        assert!(!policy.is_suspended(&id));

        // The 11th failure crosses the threshold: one suspension notice.
        assert_eq!(
            policy.handle(&id, &validation_error()).await,
            RecoveryOutcome::Replied
        );
        assert!(policy.is_suspended(&id));
        let notices = sink.count();

        // Further failures while suspended produce no replies at all.
        for _ in 0..3 {
            assert_eq!(
                policy.handle(&id, &validation_error()).await,
                RecoveryOutcome::Suppressed
            );
        }
        assert_eq!(sink.count(), notices);
    }

    #[tokio::test]
    async fn suspension_expires_on_its_deadline() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(store, &SessionConfig::default());
        let sink = Arc::new(RecordingSink::new());
        let policy = RecoveryPolicy::new(
            RecoveryConfig {
                failure_threshold: 1,
                suspension: Duration::from_millis(20),
                ..RecoveryConfig::default()
            },
            sessions,
            Arc::clone(&sink) as Arc<dyn MessageSink>,
        );
        let id = identity();

        policy.handle(&id, &validation_error()).await;
        policy.handle(&id, &validation_error()).await;
        assert!(policy.is_suspended(&id));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!policy.is_suspended(&id));
        assert_eq!(
            policy.handle(&id, &validation_error()).await,
            RecoveryOutcome::Replied
        );
    }

    #[tokio::test]
    async fn statistics_reflect_tracking() {
        let (policy, _sink) = policy();
        policy.handle(&identity(), &validation_error()).await;
        let stats = policy.statistics();
        assert_eq!(stats.tracked_identities, 1);
        assert_eq!(stats.recent_failures, 1);
        assert_eq!(stats.suspended_identities, 0);
    }
}
