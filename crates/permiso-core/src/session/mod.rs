//! Persistent per-user session model.
//!
//! A [`Session`] is the full persisted state for one identity in the intake
//! dialogue: where the user is (a [`DialogueState`]), what has been collected
//! so far, how often each field was rejected, and the bounded navigation
//! history. Sessions are serialized as JSON blobs by the session store; a
//! blob whose state no longer deserializes is treated as corrupted and
//! discarded, never acted upon.

mod dialogue;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use dialogue::{
    ConfirmationContext, DialogueState, ErrorContext, FormContext, HelpContext,
    InvalidStateError, MenuContext, NotificationContext, StateType, StatusContext,
};

use crate::fields::{FieldGroup, FieldKey};
use crate::identity::UserId;

/// Maximum number of prior states retained for "go back" navigation.
pub const HISTORY_CAP: usize = 5;

/// Full persisted state for one user identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Normalized identity owning this session.
    pub identity: UserId,

    /// Where the dialogue currently is.
    pub state: DialogueState,

    /// Collected field values, keyed by the closed field set.
    #[serde(default)]
    pub data: BTreeMap<FieldKey, String>,

    /// Fields already accepted. A field appears here at most once by
    /// construction (it is a set).
    #[serde(default)]
    pub completed: BTreeSet<FieldKey>,

    /// Rejected submission count per field, used to escalate help.
    #[serde(default)]
    pub attempts: BTreeMap<FieldKey, u32>,

    /// Prior states, oldest first, capped at [`HISTORY_CAP`].
    #[serde(default)]
    pub history: VecDeque<DialogueState>,

    /// Snapshot taken when entering a help state, restored on exit.
    #[serde(default)]
    pub return_to: Option<Box<Session>>,

    /// Reference to the collaborator-created application, if any.
    #[serde(default)]
    pub application_id: Option<String>,

    /// Reference to the collaborator-created payment link, if any.
    #[serde(default)]
    pub payment_reference: Option<String>,

    /// Creation time of the session record.
    pub created_at: DateTime<Utc>,

    /// Last accepted activity; the session expires 24 h after this.
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Creates a fresh idle session for an identity.
    #[must_use]
    pub fn new(identity: UserId, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            state: DialogueState::Idle,
            data: BTreeMap::new(),
            completed: BTreeSet::new(),
            attempts: BTreeMap::new(),
            history: VecDeque::new(),
            return_to: None,
            application_id: None,
            payment_reference: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Refreshes the activity timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Stores a field value. Overwrites any prior value for the same key.
    pub fn set_field(&mut self, field: FieldKey, value: impl Into<String>) {
        self.data.insert(field, value.into());
    }

    /// Marks a field as accepted. Idempotent.
    ///
    /// Returns `true` if the field was newly completed.
    pub fn mark_completed(&mut self, field: FieldKey) -> bool {
        self.completed.insert(field)
    }

    /// Increments and returns the rejected-submission count for a field.
    pub fn record_attempt(&mut self, field: FieldKey) -> u32 {
        let count = self.attempts.entry(field).or_insert(0);
        *count += 1;
        *count
    }

    /// Pushes the current state onto the history, evicting the oldest entry
    /// once [`HISTORY_CAP`] is reached.
    pub fn push_history(&mut self, state: DialogueState) {
        if self.history.len() >= HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(state);
    }

    /// Next field to request, following the fixed completion order.
    #[must_use]
    pub fn next_missing_field(&self) -> Option<FieldKey> {
        FieldKey::next_missing(&self.completed)
    }

    /// Returns `true` once every field in the fixed order is completed.
    #[must_use]
    pub fn is_form_complete(&self) -> bool {
        self.next_missing_field().is_none()
    }

    /// Collected values belonging to one field group.
    #[must_use]
    pub fn group_data(&self, group: FieldGroup) -> BTreeMap<FieldKey, &str> {
        self.data
            .iter()
            .filter(|(k, _)| k.group() == group)
            .map(|(k, v)| (*k, v.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(UserId::parse("5210000000001").unwrap(), Utc::now())
    }

    #[test]
    fn fresh_session_is_idle_and_empty() {
        let s = session();
        assert_eq!(s.state, DialogueState::Idle);
        assert!(s.data.is_empty());
        assert!(s.history.is_empty());
        assert_eq!(s.next_missing_field(), Some(FieldKey::NombreCompleto));
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let mut s = session();
        assert!(s.mark_completed(FieldKey::Email));
        assert!(!s.mark_completed(FieldKey::Email));
        assert_eq!(s.completed.len(), 1);
    }

    #[test]
    fn record_attempt_counts_up() {
        let mut s = session();
        assert_eq!(s.record_attempt(FieldKey::CurpRfc), 1);
        assert_eq!(s.record_attempt(FieldKey::CurpRfc), 2);
        assert_eq!(s.record_attempt(FieldKey::Email), 1);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let mut s = session();
        for i in 0..8 {
            let state = if i % 2 == 0 {
                DialogueState::Menu(MenuContext::Main)
            } else {
                DialogueState::Form(FormContext::NewPermit)
            };
            s.push_history(state);
        }
        assert_eq!(s.history.len(), HISTORY_CAP);
        // 8 pushes, cap 5: entries 3..8 remain, oldest (index 3, odd) first.
        assert_eq!(
            s.history.front(),
            Some(&DialogueState::Form(FormContext::NewPermit))
        );
    }

    #[test]
    fn group_data_splits_by_group() {
        let mut s = session();
        s.set_field(FieldKey::NombreCompleto, "Ana Torres");
        s.set_field(FieldKey::Marca, "Nissan");
        let personal = s.group_data(FieldGroup::Personal);
        assert_eq!(personal.len(), 1);
        assert_eq!(personal.get(&FieldKey::NombreCompleto), Some(&"Ana Torres"));
        let vehicle = s.group_data(FieldGroup::Vehicle);
        assert_eq!(vehicle.get(&FieldKey::Marca), Some(&"Nissan"));
    }

    #[test]
    fn serde_round_trip_preserves_all_fields() {
        let mut s = session();
        s.state = DialogueState::Form(FormContext::NewPermit);
        s.set_field(FieldKey::Email, "a@b.mx");
        s.mark_completed(FieldKey::Email);
        s.record_attempt(FieldKey::CurpRfc);
        s.push_history(DialogueState::Menu(MenuContext::Main));
        s.application_id = Some("APP-1".into());

        let blob = serde_json::to_vec(&s).unwrap();
        let back: Session = serde_json::from_slice(&blob).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn unknown_state_type_fails_deserialization() {
        let blob = r#"{
            "identity": "5210000000001",
            "state": {"type": "galaxy"},
            "created_at": "2026-01-01T00:00:00Z",
            "last_activity_at": "2026-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<Session>(blob).is_err());
    }
}
