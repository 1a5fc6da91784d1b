//! State machine: accepted input vocabulary, breadcrumbs, and navigation.
//!
//! Every reachable [`DialogueState`] has a fixed vocabulary declared here.
//! A vocabulary is a set of exact tokens, optionally the "any text" sentinel
//! (any non-empty string is accepted), and, for menu states, an implied
//! numeric range derived from the highest numeric token declared.
//!
//! Navigation is push/pop over the session's bounded history: transitions to
//! a different state key push the old key; `navigate_back` pops it or falls
//! back to the root menu. Help states snapshot the session so the exact
//! pre-help state is restored on exit.

use std::collections::BTreeMap;

use crate::fields::FieldKey;
use crate::session::{DialogueState, HelpContext, Session, StateType};

/// Accepted input vocabulary for one dialogue state.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    /// Exact tokens accepted (already lowercase).
    pub tokens: &'static [&'static str],
    /// Whether any non-empty text is accepted.
    pub any_text: bool,
}

impl Vocabulary {
    /// Highest numeric token declared, if any. Menu states accept every
    /// positive integer up to this bound.
    #[must_use]
    pub fn max_numeric(&self) -> Option<u32> {
        self.tokens.iter().filter_map(|t| t.parse::<u32>().ok()).max()
    }
}

/// Navigation commands recognized across states.
///
/// These tokens are also the reserved words of the command-injection guard
/// in the validator: a form answer may not smuggle one in behind the
/// command marker.
pub const COMMAND_TOKENS: &[&str] = &["menu", "ayuda", "atras", "cancelar", "estado"];

/// Returns the vocabulary for a state.
#[must_use]
pub const fn vocabulary(state: DialogueState) -> Vocabulary {
    use crate::session::{
        ConfirmationContext as Cf, ErrorContext as Er, FormContext as Fo, HelpContext as He,
        MenuContext as Me, NotificationContext as No, StatusContext as St,
    };
    match state {
        DialogueState::Idle => Vocabulary {
            tokens: &["hola", "menu", "inicio"],
            any_text: true,
        },
        DialogueState::Menu(Me::Main) => Vocabulary {
            tokens: &["1", "2", "3", "4", "menu", "ayuda"],
            any_text: false,
        },
        DialogueState::Menu(Me::PermitType) => Vocabulary {
            tokens: &["1", "2", "3", "atras", "menu"],
            any_text: false,
        },
        DialogueState::Form(Fo::PrivacyConsent) => Vocabulary {
            tokens: &["acepto", "si", "sí", "no", "atras", "menu"],
            any_text: false,
        },
        DialogueState::Form(Fo::NewPermit | Fo::RenewalEdit | Fo::FieldEdit) => Vocabulary {
            tokens: &["atras", "menu", "ayuda", "cancelar"],
            any_text: true,
        },
        DialogueState::Confirmation(Cf::DataReview) => Vocabulary {
            tokens: &["si", "sí", "confirmar", "no", "editar", "cancelar", "menu"],
            any_text: false,
        },
        DialogueState::Confirmation(Cf::Cancellation) => Vocabulary {
            tokens: &["si", "sí", "no", "menu"],
            any_text: false,
        },
        DialogueState::Status(St::Application) => Vocabulary {
            tokens: &["actualizar", "atras", "menu"],
            any_text: false,
        },
        DialogueState::Help(He::General | He::Field) => Vocabulary {
            tokens: &["volver", "menu"],
            any_text: true,
        },
        DialogueState::Error(Er::Validation | Er::Recovery) => Vocabulary {
            tokens: &["1", "2", "3", "menu"],
            any_text: false,
        },
        DialogueState::Notification(No::Payment | No::Document) => Vocabulary {
            tokens: &["estado", "menu"],
            any_text: false,
        },
    }
}

/// Human-readable breadcrumb label for a state.
#[must_use]
pub const fn breadcrumb(state: DialogueState) -> &'static str {
    use crate::session::{
        ConfirmationContext as Cf, ErrorContext as Er, FormContext as Fo, HelpContext as He,
        MenuContext as Me, NotificationContext as No, StatusContext as St,
    };
    match state {
        DialogueState::Idle => "Inicio",
        DialogueState::Menu(Me::Main) => "Menú principal",
        DialogueState::Menu(Me::PermitType) => "Tipo de permiso",
        DialogueState::Form(Fo::NewPermit) => "Nuevo permiso",
        DialogueState::Form(Fo::RenewalEdit) => "Renovación",
        DialogueState::Form(Fo::PrivacyConsent) => "Aviso de privacidad",
        DialogueState::Form(Fo::FieldEdit) => "Editar dato",
        DialogueState::Confirmation(Cf::DataReview) => "Revisión de datos",
        DialogueState::Confirmation(Cf::Cancellation) => "Cancelar trámite",
        DialogueState::Status(St::Application) => "Estado del trámite",
        DialogueState::Help(He::General) => "Ayuda",
        DialogueState::Help(He::Field) => "Ayuda del campo",
        DialogueState::Error(Er::Validation) => "Dato no válido",
        DialogueState::Error(Er::Recovery) => "Recuperación",
        DialogueState::Notification(No::Payment) => "Pago",
        DialogueState::Notification(No::Document) => "Documento",
    }
}

/// Normalizes raw input for vocabulary matching: trim + lowercase.
#[must_use]
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Checks raw input against the current state's vocabulary.
///
/// Accepts when the normalized input exactly matches a declared token, when
/// the vocabulary carries the any-text sentinel and the input is non-empty,
/// or, for menu states, when the input is a positive integer not above the
/// highest numeric token declared.
#[must_use]
pub fn is_valid_input(session: &Session, raw: &str) -> bool {
    let input = normalize_token(raw);
    if input.is_empty() {
        return false;
    }
    let vocab = vocabulary(session.state);
    if vocab.tokens.contains(&input.as_str()) {
        return true;
    }
    if vocab.any_text {
        return true;
    }
    if session.state.state_type() == StateType::Menu {
        if let (Ok(n), Some(max)) = (input.parse::<u32>(), vocab.max_numeric()) {
            return n >= 1 && n <= max;
        }
    }
    false
}

/// Moves the session to `target`, merging `data` into the collected fields.
///
/// When the target differs from the current state key, the current key is
/// pushed onto the history (capped, oldest dropped). The pairing of type and
/// context is guaranteed valid by construction of [`DialogueState`];
/// loosely-typed callers validate via [`DialogueState::compose`] first.
#[must_use]
pub fn transition(
    mut session: Session,
    target: DialogueState,
    data: BTreeMap<FieldKey, String>,
) -> Session {
    if session.state != target {
        let previous = session.state;
        session.push_history(previous);
        session.state = target;
    }
    for (field, value) in data {
        session.set_field(field, value);
    }
    session
}

/// Pops the most recent history entry, or falls back to the root menu when
/// the history is empty. Collected data is preserved either way.
#[must_use]
pub fn navigate_back(mut session: Session) -> Session {
    session.state = session.history.pop_back().unwrap_or(DialogueState::ROOT);
    session
}

/// Switches to a help state, snapshotting the current session so
/// [`exit_help`] can restore it verbatim.
///
/// Entering help from within help keeps the original snapshot instead of
/// nesting a second one.
#[must_use]
pub fn enter_help(mut session: Session, context: HelpContext) -> Session {
    if session.state.state_type() != StateType::Help {
        let mut snapshot = session.clone();
        snapshot.return_to = None;
        session.return_to = Some(Box::new(snapshot));
    }
    session.state = DialogueState::Help(context);
    session
}

/// Leaves a help state, restoring the snapshot taken on entry.
///
/// Falls back to the root menu when the session is not in help or the
/// snapshot is missing.
#[must_use]
pub fn exit_help(mut session: Session) -> Session {
    if session.state.state_type() == StateType::Help {
        if let Some(snapshot) = session.return_to.take() {
            return *snapshot;
        }
    }
    session.return_to = None;
    session.state = DialogueState::ROOT;
    session
}

/// Renders the breadcrumb trail, oldest first, ending at the current state.
#[must_use]
pub fn trail(session: &Session) -> String {
    let mut parts: Vec<&'static str> = session.history.iter().map(|s| breadcrumb(*s)).collect();
    parts.push(breadcrumb(session.state));
    parts.join(" › ")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;
    use crate::identity::UserId;
    use crate::session::{
        ConfirmationContext, FormContext, MenuContext, HISTORY_CAP,
    };

    fn session_in(state: DialogueState) -> Session {
        let mut s = Session::new(UserId::parse("5210000000002").unwrap(), Utc::now());
        s.state = state;
        s
    }

    #[test]
    fn every_state_has_a_breadcrumb_and_vocabulary() {
        for state in DialogueState::all() {
            assert!(!breadcrumb(state).is_empty(), "{state} missing breadcrumb");
            let vocab = vocabulary(state);
            assert!(
                vocab.any_text || !vocab.tokens.is_empty(),
                "{state} accepts nothing"
            );
        }
    }

    #[test]
    fn menu_accepts_numeric_range_only() {
        let s = session_in(DialogueState::Menu(MenuContext::Main));
        assert!(is_valid_input(&s, "1"));
        assert!(is_valid_input(&s, " 4 "));
        assert!(!is_valid_input(&s, "5"));
        assert!(!is_valid_input(&s, "0"));
        assert!(!is_valid_input(&s, "nuevo permiso"));
    }

    #[test]
    fn form_accepts_any_nonempty_text() {
        let s = session_in(DialogueState::Form(FormContext::NewPermit));
        assert!(is_valid_input(&s, "María López"));
        assert!(is_valid_input(&s, "MENU"));
        assert!(!is_valid_input(&s, "   "));
    }

    #[test]
    fn confirmation_accepts_tokens_case_insensitively() {
        let s = session_in(DialogueState::Confirmation(ConfirmationContext::DataReview));
        assert!(is_valid_input(&s, "Si"));
        assert!(is_valid_input(&s, "EDITAR"));
        assert!(!is_valid_input(&s, "quiza"));
    }

    #[test]
    fn transition_pushes_history_on_key_change() {
        let s = session_in(DialogueState::Menu(MenuContext::Main));
        let s = transition(
            s,
            DialogueState::Form(FormContext::NewPermit),
            BTreeMap::new(),
        );
        assert_eq!(s.state, DialogueState::Form(FormContext::NewPermit));
        assert_eq!(s.history.back(), Some(&DialogueState::Menu(MenuContext::Main)));
    }

    #[test]
    fn transition_to_same_state_does_not_push() {
        let s = session_in(DialogueState::Menu(MenuContext::Main));
        let s = transition(s, DialogueState::Menu(MenuContext::Main), BTreeMap::new());
        assert!(s.history.is_empty());
    }

    #[test]
    fn navigate_back_on_fresh_session_yields_root_menu() {
        let s = session_in(DialogueState::Idle);
        let s = navigate_back(s);
        assert_eq!(s.state, DialogueState::ROOT);
    }

    #[test]
    fn navigate_back_preserves_data() {
        let mut s = session_in(DialogueState::Form(FormContext::NewPermit));
        s.set_field(FieldKey::Marca, "Nissan");
        s.push_history(DialogueState::Menu(MenuContext::Main));
        let s = navigate_back(s);
        assert_eq!(s.state, DialogueState::Menu(MenuContext::Main));
        assert_eq!(s.data.get(&FieldKey::Marca).map(String::as_str), Some("Nissan"));
    }

    #[test]
    fn help_round_trip_restores_snapshot() {
        let mut s = session_in(DialogueState::Form(FormContext::NewPermit));
        s.set_field(FieldKey::Color, "rojo");
        let before = s.clone();

        let s = enter_help(s, HelpContext::Field);
        assert_eq!(s.state, DialogueState::Help(HelpContext::Field));

        let restored = exit_help(s);
        assert_eq!(restored.state, before.state);
        assert_eq!(restored.data, before.data);
    }

    #[test]
    fn exit_help_without_snapshot_falls_back_to_root() {
        let s = session_in(DialogueState::Help(HelpContext::General));
        let s = exit_help(s);
        assert_eq!(s.state, DialogueState::ROOT);
    }

    #[test]
    fn nested_help_keeps_original_snapshot() {
        let s = session_in(DialogueState::Form(FormContext::RenewalEdit));
        let s = enter_help(s, HelpContext::General);
        let s = enter_help(s, HelpContext::Field);
        let restored = exit_help(s);
        assert_eq!(restored.state, DialogueState::Form(FormContext::RenewalEdit));
    }

    #[test]
    fn trail_renders_oldest_first() {
        let mut s = session_in(DialogueState::Form(FormContext::NewPermit));
        s.push_history(DialogueState::Menu(MenuContext::Main));
        assert_eq!(trail(&s), "Menú principal › Nuevo permiso");
    }

    proptest! {
        /// History never exceeds its cap, whatever transition sequence runs.
        #[test]
        fn history_stays_bounded(indices in prop::collection::vec(0usize..16, 0..64)) {
            let all = DialogueState::all();
            let mut s = session_in(DialogueState::Idle);
            for i in indices {
                s = transition(s, all[i % all.len()], BTreeMap::new());
                prop_assert!(s.history.len() <= HISTORY_CAP);
            }
        }

        /// Every state reachable by transition keeps a valid type/context
        /// pairing (compose accepts its own decomposition).
        #[test]
        fn transitions_preserve_pairing_validity(indices in prop::collection::vec(0usize..16, 1..32)) {
            let all = DialogueState::all();
            let mut s = session_in(DialogueState::Idle);
            for i in indices {
                s = transition(s, all[i % all.len()], BTreeMap::new());
                let recomposed = DialogueState::compose(
                    s.state.state_type(),
                    s.state.context_str(),
                );
                prop_assert_eq!(recomposed.unwrap(), s.state);
            }
        }
    }
}
