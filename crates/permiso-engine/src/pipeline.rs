//! The per-message engine pipeline.
//!
//! One [`Engine::handle_message`] call per inbound message, any number of
//! them concurrently. The stages, in order: provider message-id marker,
//! fingerprint dedupe, global and per-identity rate limits, suspension
//! check, extraction (outside the lock), per-identity lock, session
//! read-modify-write, save, release, reply. Any classified failure routes
//! into the recovery policy instead of reaching the transport.
//!
//! The per-state rate limit runs inside the lock, after the session is
//! re-loaded: the quota charge and the state it is keyed on are then
//! mutually consistent.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use permiso_core::config::EngineConfig;
use permiso_core::dedupe::DedupeCache;
use permiso_core::extract::{
    ExtractionOutcome, ExtractionRequest, FieldExtractor, Intent, PatternExtractor,
};
use permiso_core::fields::FieldKey;
use permiso_core::identity::{message_marker_key, UserId};
use permiso_core::ratelimit::{Decision, RateLimiter, Scope};
use permiso_core::session::{
    ConfirmationContext, DialogueState, ErrorContext, FormContext, HelpContext, MenuContext,
    NotificationContext, Session, StateType, StatusContext,
};
use permiso_core::state::{
    breadcrumb, enter_help, exit_help, is_valid_input, navigate_back, normalize_token, trail,
    transition, COMMAND_TOKENS,
};
use permiso_core::validate::validate_field;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::lock::LockManager;
use crate::outbound::{MessageSink, OutboundMessage};
use crate::recovery::{RecoveryPolicy, RecoveryStats};
use crate::session_store::SessionStore;
use crate::store::{KvStore, RetryStore};

/// Escalate to the validation-error context after this many rejected
/// attempts on the same field.
const ATTEMPT_ESCALATION: u32 = 3;

/// One inbound message from the transport collaborator.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Sender identity.
    pub identity: UserId,
    /// Raw message text.
    pub raw_text: String,
    /// Provider-assigned message id, used for duplicate suppression.
    pub message_id: String,
    /// Provider receive timestamp.
    pub received_at: DateTime<Utc>,
}

/// What the engine did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed normally; a reply went out.
    Replied,
    /// A failure was classified and the recovery policy answered.
    Recovered,
    /// Dropped as a duplicate (marker or fingerprint).
    DuplicateDropped,
    /// Rejected by a rate limit; the user was told the wait.
    RateLimited,
    /// The identity is suspended; dropped silently.
    Suspended,
    /// The identity lock stayed busy; treated as a concurrent duplicate.
    ConcurrentDropped,
    /// Empty input; nothing to do.
    Ignored,
}

/// Read-only snapshot of the engine's in-process state.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    /// Fingerprints currently cached by the deduplicator.
    pub dedupe_entries: usize,
    /// Scopes currently tracked by the rate limiter.
    pub tracked_rate_scopes: usize,
    /// Recovery policy snapshot.
    pub recovery: RecoveryStats,
}

/// The conversation session engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn KvStore>,
    sessions: SessionStore,
    locks: LockManager,
    dedupe: DedupeCache,
    limiter: RateLimiter,
    extractor: Arc<dyn FieldExtractor>,
    sink: Arc<dyn MessageSink>,
    recovery: RecoveryPolicy,
}

impl Engine {
    /// Assembles an engine over a store backend, an extraction collaborator,
    /// and a transport sink.
    ///
    /// The backend is wrapped with the configured retry policy; the session
    /// store, locks, and message-id markers all share it.
    #[must_use]
    pub fn new(
        backend: Arc<dyn KvStore>,
        extractor: Arc<dyn FieldExtractor>,
        sink: Arc<dyn MessageSink>,
        config: EngineConfig,
    ) -> Self {
        let store: Arc<dyn KvStore> = Arc::new(RetryStore::new(backend, &config.store));
        let sessions = SessionStore::new(Arc::clone(&store), &config.session);
        let locks = LockManager::new(Arc::clone(&store), config.lock.clone());
        let recovery = RecoveryPolicy::new(
            config.recovery.clone(),
            sessions.clone(),
            Arc::clone(&sink),
        );
        Self {
            dedupe: DedupeCache::new(config.dedupe.clone()),
            limiter: RateLimiter::new(config.rate.clone()),
            store,
            sessions,
            locks,
            extractor,
            sink,
            recovery,
            config,
        }
    }

    /// Handles one inbound message end to end.
    pub async fn handle_message(&self, msg: InboundMessage) -> Outcome {
        let now_secs = u64::try_from(msg.received_at.timestamp()).unwrap_or(0);

        if let Some(outcome) = self.check_duplicates(&msg, now_secs).await {
            return outcome;
        }

        for scope in [Scope::Global, Scope::Identity(msg.identity.clone())] {
            if let Decision::Limited { retry_after } = self.limiter.check(scope, now_secs) {
                let failure = EngineError::RateLimited { retry_after };
                self.recovery.handle(&msg.identity, &failure).await;
                return Outcome::RateLimited;
            }
        }

        if self.recovery.is_suspended(&msg.identity) {
            debug!(identity = %msg.identity, "message from suspended identity dropped");
            return Outcome::Suspended;
        }

        if msg.raw_text.trim().is_empty() {
            return Outcome::Ignored;
        }

        // Extraction runs before the lock is taken; its result is merged
        // under the lock using only in-memory data.
        let extraction = self.extract_if_needed(&msg).await;

        let guard = match self.locks.acquire(&msg.identity).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!(identity = %msg.identity, "lock busy, dropping as concurrent duplicate");
                return Outcome::ConcurrentDropped;
            },
            Err(err) => {
                self.recovery.handle(&msg.identity, &err.into()).await;
                return Outcome::Recovered;
            },
        };

        let result = self.process_locked(&msg, now_secs, extraction).await;

        if let Err(err) = self.locks.release(guard).await {
            warn!(identity = %msg.identity, error = %err, "lock release failed");
        }

        match result {
            Ok(reply) => match self.sink.send(&msg.identity, reply).await {
                Ok(()) => Outcome::Replied,
                Err(err) => {
                    self.recovery.handle(&msg.identity, &err.into()).await;
                    Outcome::Recovered
                },
            },
            Err(err) => {
                self.recovery.handle(&msg.identity, &err).await;
                Outcome::Recovered
            },
        }
    }

    /// Evicts aged dedupe fingerprints and rate buckets. Call periodically.
    pub fn maintain(&self, now: DateTime<Utc>) {
        let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
        self.dedupe.sweep(now_secs);
        self.limiter.prune(now_secs);
    }

    /// Read-only monitoring snapshot.
    #[must_use]
    pub fn statistics(&self) -> EngineStats {
        EngineStats {
            dedupe_entries: self.dedupe.len(),
            tracked_rate_scopes: self.limiter.tracked_scopes(),
            recovery: self.recovery.statistics(),
        }
    }

    /// Provider message-id marker plus fingerprint dedupe.
    async fn check_duplicates(&self, msg: &InboundMessage, now_secs: u64) -> Option<Outcome> {
        if !msg.message_id.is_empty() {
            let marker = message_marker_key(&msg.message_id);
            match self
                .store
                .put_if_absent(&marker, b"1", self.config.store.message_marker_ttl)
                .await
            {
                Ok(false) => {
                    debug!(message_id = %msg.message_id, "provider redelivery dropped");
                    return Some(Outcome::DuplicateDropped);
                },
                Ok(true) => {},
                // Marker writes are best-effort; the fingerprint below still
                // catches tight retransmits.
                Err(err) => warn!(error = %err, "message marker write failed"),
            }
        }
        if self.dedupe.is_duplicate(&msg.identity, &msg.raw_text, now_secs) {
            return Some(Outcome::DuplicateDropped);
        }
        None
    }

    /// Runs extraction for free-text form input, falling back to the
    /// deterministic pattern extractor when the collaborator fails.
    async fn extract_if_needed(&self, msg: &InboundMessage) -> Option<ExtractionOutcome> {
        let peek = self.sessions.load(&msg.identity).await;
        let in_form = matches!(
            peek.state,
            DialogueState::Form(
                FormContext::NewPermit | FormContext::RenewalEdit | FormContext::FieldEdit
            )
        );
        let token = normalize_token(&msg.raw_text);
        if !in_form || COMMAND_TOKENS.contains(&token.as_str()) {
            return None;
        }
        let request = ExtractionRequest {
            raw_text: msg.raw_text.clone(),
            state_key: peek.state.to_string(),
            collected: peek.data.clone(),
        };
        match self.extractor.extract(&request).await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(error = %err, "extraction collaborator failed, using pattern fallback");
                PatternExtractor.extract(&request).await.ok()
            },
        }
    }

    /// The critical section: load, mutate, save.
    async fn process_locked(
        &self,
        msg: &InboundMessage,
        now_secs: u64,
        extraction: Option<ExtractionOutcome>,
    ) -> Result<OutboundMessage, EngineError> {
        let session = self.sessions.load(&msg.identity).await;

        // Per-state quota, charged against the state the mutation will run in.
        let scope = Scope::IdentityState(msg.identity.clone(), session.state);
        if let Decision::Limited { retry_after } = self.limiter.check(scope, now_secs) {
            return Err(EngineError::RateLimited { retry_after });
        }

        let step = self.step(session, &msg.raw_text, extraction);
        match step {
            Step::Save(mut session, reply) => {
                self.sessions.save(&mut session).await?;
                Ok(reply)
            },
            Step::Clear(reply) => {
                self.sessions.clear(&msg.identity).await;
                Ok(reply)
            },
            Step::SaveThenFail(mut session, failure) => {
                self.sessions.save(&mut session).await?;
                Err(failure)
            },
        }
    }

    /// Computes the state mutation and reply for one input. Pure with
    /// respect to storage.
    fn step(
        &self,
        session: Session,
        raw: &str,
        extraction: Option<ExtractionOutcome>,
    ) -> Step {
        let token = normalize_token(raw);

        // Navigation commands are honored in every state.
        match token.as_str() {
            "menu" => {
                let session = transition(session, DialogueState::ROOT, BTreeMap::new());
                let reply = main_menu_prompt(&session);
                return Step::Save(session, reply);
            },
            "atras" => {
                let session = navigate_back(session);
                let reply = reentry_prompt(&session);
                return Step::Save(session, reply);
            },
            "ayuda" => {
                let context = match session.state.state_type() {
                    StateType::Form => HelpContext::Field,
                    _ => HelpContext::General,
                };
                let reply = help_prompt(&session, context);
                let session = enter_help(session, context);
                return Step::Save(session, reply);
            },
            "cancelar" => {
                let session = transition(
                    session,
                    DialogueState::Confirmation(ConfirmationContext::Cancellation),
                    BTreeMap::new(),
                );
                let reply = OutboundMessage::prompt(
                    "¿Seguro que quieres cancelar el trámite? Se perderá lo capturado.",
                    vec!["Sí, cancelar".to_string(), "No, continuar".to_string()],
                );
                return Step::Save(session, reply);
            },
            "estado" => {
                let reply = status_text(&session);
                let session = transition(
                    session,
                    DialogueState::Status(StatusContext::Application),
                    BTreeMap::new(),
                );
                return Step::Save(session, reply);
            },
            _ => {},
        }

        match session.state {
            DialogueState::Idle => {
                let session = transition(session, DialogueState::ROOT, BTreeMap::new());
                let reply = OutboundMessage::prompt(
                    "Hola, soy el asistente de permisos vehiculares. ¿Qué necesitas?",
                    main_menu_options(),
                );
                Step::Save(session, reply)
            },

            DialogueState::Menu(MenuContext::Main) => match token.as_str() {
                "1" => {
                    let session = transition(
                        session,
                        DialogueState::Menu(MenuContext::PermitType),
                        BTreeMap::new(),
                    );
                    let reply = OutboundMessage::prompt(
                        "¿Para qué tipo de vehículo es el permiso?",
                        vec![
                            "Auto particular".to_string(),
                            "Vehículo de carga".to_string(),
                            "Motocicleta".to_string(),
                        ],
                    );
                    Step::Save(session, reply)
                },
                "2" => {
                    let reply = status_text(&session);
                    let session = transition(
                        session,
                        DialogueState::Status(StatusContext::Application),
                        BTreeMap::new(),
                    );
                    Step::Save(session, reply)
                },
                "3" => {
                    let reply = help_prompt(&session, HelpContext::General);
                    let session = enter_help(session, HelpContext::General);
                    Step::Save(session, reply)
                },
                "4" => {
                    let session = transition(
                        session,
                        DialogueState::Confirmation(ConfirmationContext::Cancellation),
                        BTreeMap::new(),
                    );
                    let reply = OutboundMessage::prompt(
                        "¿Quieres cancelar tu trámite actual?",
                        vec!["Sí".to_string(), "No".to_string()],
                    );
                    Step::Save(session, reply)
                },
                _ => Step::Save(session, reprompt_menu()),
            },

            DialogueState::Menu(MenuContext::PermitType) => {
                if is_valid_input(&session, raw) && token.parse::<u32>().is_ok() {
                    let session = transition(
                        session,
                        DialogueState::Form(FormContext::PrivacyConsent),
                        BTreeMap::new(),
                    );
                    let reply = OutboundMessage::prompt(
                        "Antes de empezar necesito tu consentimiento para tratar \
                         tus datos según el aviso de privacidad.",
                        vec!["Acepto".to_string(), "No acepto".to_string()],
                    );
                    Step::Save(session, reply)
                } else {
                    Step::Save(session, reprompt_menu())
                }
            },

            DialogueState::Form(FormContext::PrivacyConsent) => match token.as_str() {
                "acepto" | "si" | "sí" => {
                    let session = transition(
                        session,
                        DialogueState::Form(FormContext::NewPermit),
                        BTreeMap::new(),
                    );
                    let reply = next_field_prompt(&session);
                    Step::Save(session, reply)
                },
                "no" => {
                    let session = transition(session, DialogueState::ROOT, BTreeMap::new());
                    let reply = OutboundMessage::prompt(
                        "Sin el consentimiento no puedo iniciar el trámite. \
                         ¿Algo más en lo que pueda ayudar?",
                        main_menu_options(),
                    );
                    Step::Save(session, reply)
                },
                _ => Step::Save(
                    session,
                    OutboundMessage::prompt(
                        "Responde por favor:",
                        vec!["Acepto".to_string(), "No acepto".to_string()],
                    ),
                ),
            },

            DialogueState::Form(
                FormContext::NewPermit | FormContext::RenewalEdit | FormContext::FieldEdit,
            ) => self.handle_form(session, raw, extraction),

            DialogueState::Confirmation(ConfirmationContext::DataReview) => {
                match token.as_str() {
                    "si" | "sí" | "confirmar" => {
                        let mut session = session;
                        let application_id = format!(
                            "PER-{}",
                            &Uuid::new_v4().simple().to_string()[..8].to_uppercase()
                        );
                        session.application_id = Some(application_id.clone());
                        let session = transition(
                            session,
                            DialogueState::Notification(NotificationContext::Payment),
                            BTreeMap::new(),
                        );
                        let reply = OutboundMessage::text(format!(
                            "Listo, tu solicitud quedó registrada con folio \
                             {application_id}. Te enviaremos la liga de pago en breve."
                        ));
                        Step::Save(session, reply)
                    },
                    "no" | "editar" => {
                        let session = transition(
                            session,
                            DialogueState::Form(FormContext::FieldEdit),
                            BTreeMap::new(),
                        );
                        let reply = OutboundMessage::text(
                            "¿Qué dato quieres corregir? Mándalo como \
                             `campo: valor`, por ejemplo `color: azul`.",
                        );
                        Step::Save(session, reply)
                    },
                    _ => Step::Save(
                        session,
                        OutboundMessage::prompt(
                            "¿Los datos son correctos?",
                            vec!["Sí, confirmar".to_string(), "No, editar".to_string()],
                        ),
                    ),
                }
            },

            DialogueState::Confirmation(ConfirmationContext::Cancellation) => {
                match token.as_str() {
                    "si" | "sí" => Step::Clear(OutboundMessage::text(
                        "Trámite cancelado. Escríbeme cuando quieras empezar de nuevo.",
                    )),
                    "no" => {
                        let session = navigate_back(session);
                        let reply = reentry_prompt(&session);
                        Step::Save(session, reply)
                    },
                    _ => Step::Save(
                        session,
                        OutboundMessage::prompt(
                            "¿Cancelar el trámite?",
                            vec!["Sí".to_string(), "No".to_string()],
                        ),
                    ),
                }
            },

            DialogueState::Status(StatusContext::Application) => {
                let reply = status_text(&session);
                Step::Save(session, reply)
            },

            DialogueState::Help(_) => match token.as_str() {
                "volver" => {
                    let session = exit_help(session);
                    let reply = reentry_prompt(&session);
                    Step::Save(session, reply)
                },
                _ => {
                    let reply = OutboundMessage::text(
                        "Puedo guiarte paso a paso. Escribe `volver` para regresar \
                         a donde estabas, o `menu` para ir al menú principal.",
                    );
                    Step::Save(session, reply)
                },
            },

            DialogueState::Error(ErrorContext::Recovery) => match token.as_str() {
                "1" => {
                    let session = transition(
                        session,
                        DialogueState::Form(FormContext::NewPermit),
                        BTreeMap::new(),
                    );
                    let reply = next_field_prompt(&session);
                    Step::Save(session, reply)
                },
                "2" => {
                    let identity = session.identity.clone();
                    let mut fresh = Session::new(identity, Utc::now());
                    fresh.state = DialogueState::ROOT;
                    let reply = main_menu_prompt(&fresh);
                    Step::Save(fresh, reply)
                },
                "3" => Step::Save(
                    session,
                    OutboundMessage::text(
                        "Escríbenos a soporte@permisos.example o llama al 800 000 0000.",
                    ),
                ),
                _ => Step::Save(session, recovery_options()),
            },

            DialogueState::Error(ErrorContext::Validation) => {
                let field = session.next_missing_field();
                match token.as_str() {
                    "1" => {
                        let example = field.map_or_else(
                            || "Revisa el dato y vuelve a enviarlo.".to_string(),
                            |f| format!("Ejemplo de {}: {}", f.label(), f.example()),
                        );
                        let session = transition(
                            session,
                            DialogueState::Form(FormContext::NewPermit),
                            BTreeMap::new(),
                        );
                        Step::Save(session, OutboundMessage::text(example))
                    },
                    "2" => Step::Save(
                        session,
                        OutboundMessage::text(
                            "Escríbenos a soporte@permisos.example y te ayudamos \
                             a capturar el dato.",
                        ),
                    ),
                    _ => {
                        let session = transition(
                            session,
                            DialogueState::Form(FormContext::NewPermit),
                            BTreeMap::new(),
                        );
                        let reply = next_field_prompt(&session);
                        Step::Save(session, reply)
                    },
                }
            },

            DialogueState::Notification(_) => Step::Save(
                session,
                OutboundMessage::text(
                    "Escribe `estado` para ver tu trámite o `menu` para el menú principal.",
                ),
            ),
        }
    }

    /// Free-text form input: validate the expected field, rescue through
    /// extraction, or record the failed attempt.
    fn handle_form(
        &self,
        mut session: Session,
        raw: &str,
        extraction: Option<ExtractionOutcome>,
    ) -> Step {
        let Some(field) = session.next_missing_field() else {
            let session = transition(
                session,
                DialogueState::Confirmation(ConfirmationContext::DataReview),
                BTreeMap::new(),
            );
            let reply = review_prompt(&session);
            return Step::Save(session, reply);
        };

        match validate_field(field, raw) {
            Ok(value) => {
                session.set_field(field, value);
                session.mark_completed(field);
                if let Some(outcome) = extraction {
                    merge_extracted(&mut session, outcome);
                }
                advance(session)
            },
            Err(field_error) => {
                if let Some(outcome) = extraction {
                    if outcome.intent == Intent::Cancelling {
                        let session = transition(
                            session,
                            DialogueState::Confirmation(ConfirmationContext::Cancellation),
                            BTreeMap::new(),
                        );
                        let reply = OutboundMessage::prompt(
                            "Entiendo, ¿quieres cancelar el trámite?",
                            vec!["Sí".to_string(), "No".to_string()],
                        );
                        return Step::Save(session, reply);
                    }
                    let applied = merge_extracted(&mut session, outcome);
                    if applied > 0 {
                        return advance(session);
                    }
                }

                let attempts = session.record_attempt(field);
                if attempts >= ATTEMPT_ESCALATION {
                    session = transition(
                        session,
                        DialogueState::Error(ErrorContext::Validation),
                        BTreeMap::new(),
                    );
                }
                Step::SaveThenFail(
                    session,
                    EngineError::Validation(field_error),
                )
            },
        }
    }
}

/// Result of one state-machine step.
enum Step {
    /// Persist the session and send the reply.
    Save(Session, OutboundMessage),
    /// Delete the session record and send the reply.
    Clear(OutboundMessage),
    /// Persist the session, then surface the failure to recovery.
    SaveThenFail(Session, EngineError),
}

/// Applies validated extraction candidates to not-yet-completed fields.
/// Returns how many were applied.
fn merge_extracted(session: &mut Session, outcome: ExtractionOutcome) -> usize {
    let mut applied = 0;
    for (field, candidate) in outcome.fields {
        if session.completed.contains(&field) {
            continue;
        }
        if let Ok(value) = validate_field(field, &candidate) {
            session.set_field(field, value);
            session.mark_completed(field);
            applied += 1;
        }
    }
    applied
}

/// Moves a form session forward: next field prompt, or review when done.
fn advance(session: Session) -> Step {
    if session.is_form_complete() {
        let session = transition(
            session,
            DialogueState::Confirmation(ConfirmationContext::DataReview),
            BTreeMap::new(),
        );
        let reply = review_prompt(&session);
        Step::Save(session, reply)
    } else {
        let reply = next_field_prompt(&session);
        Step::Save(session, reply)
    }
}

fn main_menu_options() -> Vec<String> {
    vec![
        "Nuevo permiso".to_string(),
        "Estado de mi trámite".to_string(),
        "Ayuda".to_string(),
        "Cancelar trámite".to_string(),
    ]
}

fn main_menu_prompt(session: &Session) -> OutboundMessage {
    OutboundMessage::prompt(format!("{}. Elige una opción:", trail(session)), main_menu_options())
}

fn reprompt_menu() -> OutboundMessage {
    OutboundMessage::prompt("Elige una opción del menú:", main_menu_options())
}

fn next_field_prompt(session: &Session) -> OutboundMessage {
    match session.next_missing_field() {
        Some(field) => OutboundMessage::text(format!(
            "{}\nPor favor mándame tu {}.",
            trail(session),
            field.label()
        )),
        None => review_prompt(session),
    }
}

/// Prompt shown when navigation re-enters a state (back, help exit).
fn reentry_prompt(session: &Session) -> OutboundMessage {
    match session.state {
        DialogueState::Menu(MenuContext::Main) => main_menu_prompt(session),
        DialogueState::Form(
            FormContext::NewPermit | FormContext::RenewalEdit | FormContext::FieldEdit,
        ) => next_field_prompt(session),
        DialogueState::Confirmation(ConfirmationContext::DataReview) => review_prompt(session),
        _ => OutboundMessage::text(format!("Estás en: {}.", trail(session))),
    }
}

fn review_prompt(session: &Session) -> OutboundMessage {
    let mut body = String::from("Revisa tus datos:");
    for field in FieldKey::ORDERED {
        if let Some(value) = session.data.get(field) {
            body.push_str(&format!("\n• {}: {value}", field.label()));
        }
    }
    OutboundMessage::prompt(
        body,
        vec!["Sí, confirmar".to_string(), "No, editar".to_string()],
    )
}

fn status_text(session: &Session) -> OutboundMessage {
    match &session.application_id {
        Some(id) => OutboundMessage::text(format!(
            "Tu trámite {id} está en proceso. Te avisaremos de cualquier cambio."
        )),
        None => OutboundMessage::text(
            "No tienes trámites activos. Escribe `menu` para iniciar uno.",
        ),
    }
}

fn help_prompt(session: &Session, context: HelpContext) -> OutboundMessage {
    let body = match context {
        HelpContext::Field => session.next_missing_field().map_or_else(
            || "Te ayudo con tu trámite.".to_string(),
            |f| format!("Te ayudo con tu {}. Ejemplo: {}", f.label(), f.example()),
        ),
        HelpContext::General => format!(
            "Estás en: {}. Puedo tramitar permisos vehiculares paso a paso.",
            breadcrumb(session.state)
        ),
    };
    OutboundMessage::text(format!("{body}\nEscribe `volver` para regresar."))
}

fn recovery_options() -> OutboundMessage {
    OutboundMessage::prompt(
        "¿Cómo quieres continuar?",
        vec![
            "Recuperar mi información".to_string(),
            "Empezar de nuevo".to_string(),
            "Contactar soporte".to_string(),
        ],
    )
}
