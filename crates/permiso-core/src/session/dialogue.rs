//! Dialogue state classification: state types and their valid sub-contexts.
//!
//! The pairing rules are encoded in the type system: each [`DialogueState`]
//! variant only admits its own context enum, so an invalid pairing such as
//! `form:payment` is unrepresentable. Loosely-typed inputs (persisted blobs,
//! collaborator strings) go through serde or [`DialogueState::compose`],
//! both of which reject anything outside the closed sets.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pairing of a state type with a context outside its valid set.
///
/// This is a programmer or configuration error, never user input. It is
/// deliberately not part of the recoverable failure taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid state pairing: {state_type}:{context}")]
pub struct InvalidStateError {
    /// The requested state type.
    pub state_type: String,
    /// The offending context (empty when a required context was missing).
    pub context: String,
}

/// The closed set of top-level state types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    /// No dialogue in progress.
    Idle,
    /// A numbered menu is being shown.
    Menu,
    /// A form field is being collected.
    Form,
    /// The user is confirming or rejecting something.
    Confirmation,
    /// Application status display.
    Status,
    /// Contextual help.
    Help,
    /// Error recovery dialogue.
    Error,
    /// One-way notice (payment, document ready).
    Notification,
}

impl StateType {
    /// Wire name of the state type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Menu => "menu",
            Self::Form => "form",
            Self::Confirmation => "confirmation",
            Self::Status => "status",
            Self::Help => "help",
            Self::Error => "error",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contexts valid within [`StateType::Menu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuContext {
    /// Root menu.
    Main,
    /// Permit type selection.
    PermitType,
}

/// Contexts valid within [`StateType::Form`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormContext {
    /// Collecting fields for a new permit.
    NewPermit,
    /// Editing fields of a renewal.
    RenewalEdit,
    /// Privacy notice acceptance.
    PrivacyConsent,
    /// Editing one specific field after review.
    FieldEdit,
}

/// Contexts valid within [`StateType::Confirmation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationContext {
    /// Reviewing collected data before submission.
    DataReview,
    /// Confirming a cancellation request.
    Cancellation,
}

/// Contexts valid within [`StateType::Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusContext {
    /// Application progress display.
    Application,
}

/// Contexts valid within [`StateType::Help`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelpContext {
    /// General help.
    General,
    /// Help about the field currently being collected.
    Field,
}

/// Contexts valid within [`StateType::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorContext {
    /// A field-level validation failure.
    Validation,
    /// Recovery choices after a corrupted or failed session.
    Recovery,
}

/// Contexts valid within [`StateType::Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationContext {
    /// Payment link or reminder.
    Payment,
    /// Document ready for delivery.
    Document,
}

/// Where a session currently is: a state type plus its context.
///
/// Serialized adjacently tagged, e.g. `{"type":"form","context":"new_permit"}`
/// or `{"type":"idle"}`. An unknown type or an out-of-set context fails
/// deserialization, which the session store treats as a corrupted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "context", rename_all = "snake_case")]
pub enum DialogueState {
    /// No dialogue in progress. Admits no context.
    Idle,
    /// Menu display.
    Menu(MenuContext),
    /// Form field collection.
    Form(FormContext),
    /// Confirmation prompt.
    Confirmation(ConfirmationContext),
    /// Status display.
    Status(StatusContext),
    /// Help display.
    Help(HelpContext),
    /// Error recovery.
    Error(ErrorContext),
    /// One-way notice.
    Notification(NotificationContext),
}

impl DialogueState {
    /// Root state users fall back to when history is exhausted.
    pub const ROOT: Self = Self::Menu(MenuContext::Main);

    /// Returns the top-level state type.
    #[must_use]
    pub const fn state_type(&self) -> StateType {
        match self {
            Self::Idle => StateType::Idle,
            Self::Menu(_) => StateType::Menu,
            Self::Form(_) => StateType::Form,
            Self::Confirmation(_) => StateType::Confirmation,
            Self::Status(_) => StateType::Status,
            Self::Help(_) => StateType::Help,
            Self::Error(_) => StateType::Error,
            Self::Notification(_) => StateType::Notification,
        }
    }

    /// Wire name of the context, if the state carries one.
    #[must_use]
    pub const fn context_str(&self) -> Option<&'static str> {
        match self {
            Self::Idle => None,
            Self::Menu(c) => Some(match c {
                MenuContext::Main => "main",
                MenuContext::PermitType => "permit_type",
            }),
            Self::Form(c) => Some(match c {
                FormContext::NewPermit => "new_permit",
                FormContext::RenewalEdit => "renewal_edit",
                FormContext::PrivacyConsent => "privacy_consent",
                FormContext::FieldEdit => "field_edit",
            }),
            Self::Confirmation(c) => Some(match c {
                ConfirmationContext::DataReview => "data_review",
                ConfirmationContext::Cancellation => "cancellation",
            }),
            Self::Status(c) => Some(match c {
                StatusContext::Application => "application",
            }),
            Self::Help(c) => Some(match c {
                HelpContext::General => "general",
                HelpContext::Field => "field",
            }),
            Self::Error(c) => Some(match c {
                ErrorContext::Validation => "validation",
                ErrorContext::Recovery => "recovery",
            }),
            Self::Notification(c) => Some(match c {
                NotificationContext::Payment => "payment",
                NotificationContext::Document => "document",
            }),
        }
    }

    /// Composes a state from loosely-typed parts, validating the pairing.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] when `context` is not in the valid set
    /// for `state_type` (including a missing context where one is required,
    /// or a context supplied for `idle`).
    pub fn compose(
        state_type: StateType,
        context: Option<&str>,
    ) -> Result<Self, InvalidStateError> {
        let invalid = || InvalidStateError {
            state_type: state_type.to_string(),
            context: context.unwrap_or_default().to_string(),
        };
        match (state_type, context) {
            (StateType::Idle, None) => Ok(Self::Idle),
            (StateType::Menu, Some("main")) => Ok(Self::Menu(MenuContext::Main)),
            (StateType::Menu, Some("permit_type")) => Ok(Self::Menu(MenuContext::PermitType)),
            (StateType::Form, Some("new_permit")) => Ok(Self::Form(FormContext::NewPermit)),
            (StateType::Form, Some("renewal_edit")) => Ok(Self::Form(FormContext::RenewalEdit)),
            (StateType::Form, Some("privacy_consent")) => {
                Ok(Self::Form(FormContext::PrivacyConsent))
            },
            (StateType::Form, Some("field_edit")) => Ok(Self::Form(FormContext::FieldEdit)),
            (StateType::Confirmation, Some("data_review")) => {
                Ok(Self::Confirmation(ConfirmationContext::DataReview))
            },
            (StateType::Confirmation, Some("cancellation")) => {
                Ok(Self::Confirmation(ConfirmationContext::Cancellation))
            },
            (StateType::Status, Some("application")) => {
                Ok(Self::Status(StatusContext::Application))
            },
            (StateType::Help, Some("general")) => Ok(Self::Help(HelpContext::General)),
            (StateType::Help, Some("field")) => Ok(Self::Help(HelpContext::Field)),
            (StateType::Error, Some("validation")) => Ok(Self::Error(ErrorContext::Validation)),
            (StateType::Error, Some("recovery")) => Ok(Self::Error(ErrorContext::Recovery)),
            (StateType::Notification, Some("payment")) => {
                Ok(Self::Notification(NotificationContext::Payment))
            },
            (StateType::Notification, Some("document")) => {
                Ok(Self::Notification(NotificationContext::Document))
            },
            _ => Err(invalid()),
        }
    }

    /// Every reachable state, for table checks and property tests.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Menu(MenuContext::Main),
            Self::Menu(MenuContext::PermitType),
            Self::Form(FormContext::NewPermit),
            Self::Form(FormContext::RenewalEdit),
            Self::Form(FormContext::PrivacyConsent),
            Self::Form(FormContext::FieldEdit),
            Self::Confirmation(ConfirmationContext::DataReview),
            Self::Confirmation(ConfirmationContext::Cancellation),
            Self::Status(StatusContext::Application),
            Self::Help(HelpContext::General),
            Self::Help(HelpContext::Field),
            Self::Error(ErrorContext::Validation),
            Self::Error(ErrorContext::Recovery),
            Self::Notification(NotificationContext::Payment),
            Self::Notification(NotificationContext::Document),
        ]
    }
}

impl fmt::Display for DialogueState {
    /// Renders the composite state key, e.g. `form:new_permit` or `idle`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context_str() {
            Some(ctx) => write!(f, "{}:{ctx}", self.state_type()),
            None => write!(f, "{}", self.state_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_accepts_every_listed_pairing() {
        for state in DialogueState::all() {
            let composed =
                DialogueState::compose(state.state_type(), state.context_str()).unwrap();
            assert_eq!(composed, state);
        }
    }

    #[test]
    fn compose_rejects_cross_type_contexts() {
        assert!(DialogueState::compose(StateType::Form, Some("payment")).is_err());
        assert!(DialogueState::compose(StateType::Idle, Some("main")).is_err());
        assert!(DialogueState::compose(StateType::Menu, None).is_err());
        assert!(DialogueState::compose(StateType::Help, Some("recovery")).is_err());
    }

    #[test]
    fn display_renders_composite_key() {
        assert_eq!(DialogueState::Idle.to_string(), "idle");
        assert_eq!(
            DialogueState::Form(FormContext::NewPermit).to_string(),
            "form:new_permit"
        );
    }

    #[test]
    fn serde_uses_adjacent_tagging() {
        let json = serde_json::to_string(&DialogueState::Form(FormContext::NewPermit)).unwrap();
        assert_eq!(json, r#"{"type":"form","context":"new_permit"}"#);
        let back: DialogueState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DialogueState::Form(FormContext::NewPermit));
    }

    #[test]
    fn serde_rejects_unknown_context() {
        let err = serde_json::from_str::<DialogueState>(r#"{"type":"form","context":"payment"}"#);
        assert!(err.is_err());
    }
}
