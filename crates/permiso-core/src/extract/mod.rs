//! Extraction collaborator contract and the deterministic fallback.
//!
//! Free text is turned into structured field candidates by an external
//! language-model collaborator. The engine consumes only the contract below;
//! when the collaborator is unavailable or errors, the [`PatternExtractor`]
//! fallback keeps the dialogue functional with field-shaped pattern
//! matching: it recognizes CURP/RFC, VIN, email, and model-year shapes plus
//! explicit `label: value` pairs, and guesses the user's intent from
//! keywords.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fields::FieldKey;

/// Input to the extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Raw (already normalized) user text.
    pub raw_text: String,
    /// Composite state key of the session, e.g. `form:new_permit`.
    pub state_key: String,
    /// Fields already collected, for context.
    #[serde(default)]
    pub collected: BTreeMap<FieldKey, String>,
}

/// What the user appears to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Supplying requested data.
    ProvidingInfo,
    /// Asking a question.
    AskingQuestion,
    /// Confirming a prompt.
    Confirming,
    /// Correcting previously given data.
    Correcting,
    /// Abandoning the flow.
    Cancelling,
    /// None of the above.
    Other,
}

/// A collaborator-reported problem with one candidate field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// The field concerned.
    pub field: FieldKey,
    /// What was wrong.
    pub error: String,
    /// Optional suggestion to relay to the user.
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Output of the extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// Extracted field candidates.
    #[serde(default)]
    pub fields: BTreeMap<FieldKey, String>,
    /// Problems the collaborator noticed.
    #[serde(default)]
    pub validation_errors: Vec<FieldIssue>,
    /// Detected intent.
    pub intent: Intent,
    /// Question to ask the user when the input was ambiguous.
    #[serde(default)]
    pub clarification: Option<String>,
    /// Per-field confidence, 0.0 to 1.0.
    #[serde(default)]
    pub confidence: BTreeMap<FieldKey, f32>,
}

impl ExtractionOutcome {
    /// An empty outcome with the given intent.
    #[must_use]
    pub fn with_intent(intent: Intent) -> Self {
        Self {
            fields: BTreeMap::new(),
            validation_errors: Vec::new(),
            intent,
            clarification: None,
            confidence: BTreeMap::new(),
        }
    }
}

/// Extraction failure.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The collaborator cannot be reached.
    #[error("extraction collaborator unavailable: {reason}")]
    Unavailable {
        /// Transport-level detail.
        reason: String,
    },

    /// The collaborator answered with garbage.
    #[error("extraction failed: {reason}")]
    Failed {
        /// What went wrong.
        reason: String,
    },
}

/// Turns free text into structured field candidates.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Extracts field candidates and intent from `request`.
    async fn extract(&self, request: &ExtractionRequest)
        -> Result<ExtractionOutcome, ExtractError>;
}

// ============================================================================
// Deterministic fallback
// ============================================================================

fn curp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z]{4}\d{6}[HM][A-Z]{5}[A-Z0-9]\d\b").expect("static regex")
    })
}

fn rfc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-ZÑ&]{3,4}\d{6}[A-Z0-9]{3}\b").expect("static regex"))
}

fn vin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-HJ-NPR-Z0-9]{17}\b").expect("static regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("static regex")
    })
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("static regex"))
}

fn labeled_field(label: &str) -> Option<FieldKey> {
    match label.trim() {
        "nombre" | "nombre completo" => Some(FieldKey::NombreCompleto),
        "curp" | "rfc" | "curp o rfc" => Some(FieldKey::CurpRfc),
        "correo" | "email" | "correo electronico" | "correo electrónico" => Some(FieldKey::Email),
        "direccion" | "dirección" | "domicilio" => Some(FieldKey::Direccion),
        "marca" => Some(FieldKey::Marca),
        "modelo" => Some(FieldKey::Modelo),
        "año" | "ano" | "año modelo" | "ano modelo" => Some(FieldKey::AnoModelo),
        "color" => Some(FieldKey::Color),
        "serie" | "vin" | "numero de serie" | "número de serie" => Some(FieldKey::NumeroSerie),
        "motor" | "numero de motor" | "número de motor" => Some(FieldKey::NumeroMotor),
        _ => None,
    }
}

const CANCEL_MARKERS: &[&str] = &["cancelar", "ya no quiero", "olvidalo", "olvídalo"];
const CONFIRM_MARKERS: &[&str] = &["si", "sí", "confirmo", "correcto", "acepto", "de acuerdo"];
const CORRECT_MARKERS: &[&str] = &["cambiar", "corregir", "me equivoque", "me equivoqué", "esta mal", "está mal"];
const QUESTION_STARTERS: &[&str] = &["que", "qué", "como", "cómo", "cuanto", "cuánto", "donde", "dónde", "por que", "por qué", "cual", "cuál"];

/// Deterministic field-shaped fallback extractor.
///
/// Used whenever the language-model collaborator is unavailable. It never
/// errs; at worst it returns an empty outcome with [`Intent::Other`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternExtractor;

impl PatternExtractor {
    fn detect_intent(text: &str, found_fields: bool) -> Intent {
        let lower = text.trim().to_lowercase();
        if CANCEL_MARKERS.iter().any(|m| lower.contains(m)) {
            return Intent::Cancelling;
        }
        if lower.ends_with('?') || QUESTION_STARTERS.iter().any(|q| lower.starts_with(q)) {
            return Intent::AskingQuestion;
        }
        if CONFIRM_MARKERS.contains(&lower.as_str()) {
            return Intent::Confirming;
        }
        if CORRECT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Intent::Correcting;
        }
        if found_fields || !lower.is_empty() {
            Intent::ProvidingInfo
        } else {
            Intent::Other
        }
    }

    fn extract_shapes(text: &str, outcome: &mut ExtractionOutcome) {
        let upper = text.to_uppercase();
        if let Some(m) = curp_regex().find(&upper) {
            outcome.fields.insert(FieldKey::CurpRfc, m.as_str().to_string());
            outcome.confidence.insert(FieldKey::CurpRfc, 0.9);
        } else if let Some(m) = rfc_regex().find(&upper) {
            outcome.fields.insert(FieldKey::CurpRfc, m.as_str().to_string());
            outcome.confidence.insert(FieldKey::CurpRfc, 0.8);
        }
        if let Some(m) = vin_regex().find(&upper) {
            // A CURP also has 18 chars; only take a VIN match that is not the
            // same span as the id match.
            if outcome.fields.get(&FieldKey::CurpRfc).map(String::as_str) != Some(m.as_str()) {
                outcome.fields.insert(FieldKey::NumeroSerie, m.as_str().to_string());
                outcome.confidence.insert(FieldKey::NumeroSerie, 0.8);
            }
        }
        if let Some(m) = email_regex().find(text) {
            outcome
                .fields
                .insert(FieldKey::Email, m.as_str().to_lowercase());
            outcome.confidence.insert(FieldKey::Email, 0.9);
        }
        if let Some(m) = year_regex().find(text) {
            outcome.fields.insert(FieldKey::AnoModelo, m.as_str().to_string());
            outcome.confidence.insert(FieldKey::AnoModelo, 0.7);
        }
    }

    fn extract_labeled(text: &str, outcome: &mut ExtractionOutcome) {
        for line in text.lines() {
            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if let Some(field) = labeled_field(&label.to_lowercase()) {
                outcome.fields.insert(field, value.to_string());
                outcome.confidence.insert(field, 0.8);
            }
        }
    }
}

#[async_trait]
impl FieldExtractor for PatternExtractor {
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionOutcome, ExtractError> {
        let mut outcome = ExtractionOutcome::with_intent(Intent::Other);
        Self::extract_shapes(&request.raw_text, &mut outcome);
        Self::extract_labeled(&request.raw_text, &mut outcome);
        outcome.intent = Self::detect_intent(&request.raw_text, !outcome.fields.is_empty());
        Ok(outcome)
    }
}
