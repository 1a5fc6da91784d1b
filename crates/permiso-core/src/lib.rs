//! permiso-core - domain logic for the permit intake dialogue engine.
//!
//! This crate holds everything that needs no I/O: the session model and its
//! state machine, input validation, duplicate suppression, rate limiting,
//! the failure taxonomy, the extraction collaborator contract with its
//! deterministic fallback, and configuration. The async runtime pieces
//! (storage, locking, the message pipeline, recovery delivery) live in
//! `permiso-engine`.
//!
//! # Modules
//!
//! - [`identity`]: normalized user identity and the persisted key schema
//! - [`fields`]: the closed set of collectable form fields
//! - [`session`]: the persisted per-user session record and dialogue states
//! - [`state`]: vocabulary, breadcrumbs, and push/pop navigation
//! - [`validate`]: input normalization and per-field validation
//! - [`dedupe`]: short-window duplicate message suppression
//! - [`ratelimit`]: multi-scope fixed-window rate limiting
//! - [`error`]: the recoverable failure taxonomy and classifier
//! - [`extract`]: extraction collaborator contract and pattern fallback
//! - [`backoff`]: retry delay policies
//! - [`config`]: aggregated engine configuration

pub mod backoff;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod extract;
pub mod fields;
pub mod identity;
pub mod ratelimit;
pub mod session;
pub mod state;
pub mod validate;

pub use backoff::BackoffPolicy;
pub use config::{ConfigError, EngineConfig};
pub use dedupe::{DedupeCache, DedupeConfig};
pub use error::{classify, classify_message, ErrorKind};
pub use extract::{
    ExtractError, ExtractionOutcome, ExtractionRequest, FieldExtractor, Intent, PatternExtractor,
};
pub use fields::{FieldGroup, FieldKey};
pub use identity::{IdentityError, UserId};
pub use ratelimit::{Decision, RateConfig, RateLimiter, Scope};
pub use session::{DialogueState, InvalidStateError, Session, StateType, HISTORY_CAP};
pub use validate::{contains_command_injection, normalize, validate_field, FieldError};
