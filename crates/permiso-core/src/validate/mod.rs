//! Input normalization and per-field validation.
//!
//! Raw text from the messaging channel is hostile until proven otherwise.
//! Everything passes through [`normalize`] first: Unicode NFKC, control and
//! zero-width stripping, trimming, and truncation to the field's maximum
//! length (truncation is the policy for overflow, not rejection; it is
//! logged). Field values are then validated by shape via [`validate_field`];
//! free-text fields additionally pass the command-injection guard so a form
//! answer cannot hijack the dialogue flow.

use std::sync::OnceLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::fields::FieldKey;
use crate::state::COMMAND_TOKENS;

/// Earliest accepted model year.
pub const MIN_MODEL_YEAR: i32 = 1900;

/// Minimum alphanumeric length for VIN and engine numbers.
pub const MIN_SERIAL_LEN: usize = 5;

/// Accepted CURP/RFC length range after stripping separators.
pub const ID_LEN_RANGE: std::ops::RangeInclusive<usize> = 10..=18;

/// Maximum email length per RFC 5321.
pub const MAX_EMAIL_LEN: usize = 254;

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Nothing remained after normalization.
    #[error("{field}: empty after normalization")]
    Empty {
        /// The field being validated.
        field: FieldKey,
    },

    /// Full name had fewer than two words.
    #[error("nombre_completo: expected at least two words")]
    NameTooShort,

    /// Full name contained characters outside letters/space/hyphen/
    /// apostrophe/period.
    #[error("nombre_completo: contains characters outside the accepted set")]
    NameCharset,

    /// CURP/RFC length outside the accepted range.
    #[error("curp_rfc: expected 10-18 alphanumeric characters, got {len}")]
    IdLength {
        /// Alphanumeric length after stripping.
        len: usize,
    },

    /// VIN or engine number too short after stripping.
    #[error("{field}: expected at least {min} alphanumeric characters, got {len}")]
    SerialTooShort {
        /// The field being validated.
        field: FieldKey,
        /// Minimum accepted length.
        min: usize,
        /// Observed length.
        len: usize,
    },

    /// Email did not match the accepted shape.
    #[error("email: not a valid address")]
    EmailShape,

    /// Model year was not an integer.
    #[error("ano_modelo: not a number")]
    YearNotNumeric,

    /// Model year outside the accepted range.
    #[error("ano_modelo: {year} outside {min}-{max}")]
    YearOutOfRange {
        /// Parsed year.
        year: i32,
        /// Lower bound.
        min: i32,
        /// Upper bound.
        max: i32,
    },

    /// Free text tried to smuggle a reserved command.
    #[error("{field}: embedded command rejected")]
    CommandInjection {
        /// The field being validated.
        field: FieldKey,
    },
}

impl FieldError {
    /// The field this failure belongs to.
    #[must_use]
    pub const fn field(&self) -> FieldKey {
        match self {
            Self::Empty { field }
            | Self::SerialTooShort { field, .. }
            | Self::CommandInjection { field } => *field,
            Self::NameTooShort | Self::NameCharset => FieldKey::NombreCompleto,
            Self::IdLength { .. } => FieldKey::CurpRfc,
            Self::EmailShape => FieldKey::Email,
            Self::YearNotNumeric | Self::YearOutOfRange { .. } => FieldKey::AnoModelo,
        }
    }

    /// Short user-facing explanation in the dialogue language.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Empty { field } => format!("Necesito tu {}.", field.label()),
            Self::NameTooShort => "Escribe tu nombre y al menos un apellido.".to_string(),
            Self::NameCharset => {
                "El nombre solo puede llevar letras, espacios, guiones y puntos.".to_string()
            },
            Self::IdLength { .. } => {
                "La CURP o RFC debe tener entre 10 y 18 letras y números.".to_string()
            },
            Self::SerialTooShort { field, min, .. } => format!(
                "El {} debe tener al menos {min} caracteres.",
                field.label()
            ),
            Self::EmailShape => "Ese correo no parece válido.".to_string(),
            Self::YearNotNumeric => "Escribe el año con números, por ejemplo 2022.".to_string(),
            Self::YearOutOfRange { min, max, .. } => {
                format!("El año debe estar entre {min} y {max}.")
            },
            Self::CommandInjection { field } => {
                format!("Ese texto no es válido para {}.", field.label())
            },
        }
    }
}

fn is_stripped(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
        )
}

/// Normalizes raw input for a field: NFKC, control/zero-width stripping,
/// trimming, and truncation to the field's maximum length.
///
/// Overflow is truncated, not rejected; truncation is logged.
#[must_use]
pub fn normalize(raw: &str, field: FieldKey) -> String {
    let cleaned: String = raw.nfkc().filter(|c| !is_stripped(*c)).collect();
    let trimmed = cleaned.trim();
    let max = field.max_len();
    if trimmed.chars().count() > max {
        warn!(
            field = %field,
            len = trimmed.chars().count(),
            max,
            "input truncated to field maximum"
        );
        trimmed.chars().take(max).collect::<String>().trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\p{Latin} .'\-]+$").expect("static regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("static regex")
    })
}

fn command_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words = COMMAND_TOKENS.join("|");
        Regex::new(&format!(r"(?i)(?:^|\s)/\s?(?:{words})\b")).expect("static regex")
    })
}

/// Detects a reserved command word behind the command marker at a token
/// boundary, e.g. `"rojo /menu"`.
#[must_use]
pub fn contains_command_injection(text: &str) -> bool {
    command_regex().is_match(text)
}

fn strip_to_alnum_upper(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Validates raw input for one field, returning the sanitized value.
///
/// # Errors
///
/// Returns the specific [`FieldError`] describing why the input was
/// rejected; the caller re-prompts the user and records the attempt.
pub fn validate_field(field: FieldKey, raw: &str) -> Result<String, FieldError> {
    let value = normalize(raw, field);
    if value.is_empty() {
        return Err(FieldError::Empty { field });
    }
    match field {
        FieldKey::NombreCompleto => {
            if !name_regex().is_match(&value) {
                return Err(FieldError::NameCharset);
            }
            if value.split_whitespace().count() < 2 {
                return Err(FieldError::NameTooShort);
            }
            Ok(value.split_whitespace().collect::<Vec<_>>().join(" "))
        },
        FieldKey::CurpRfc => {
            let stripped = strip_to_alnum_upper(&value);
            if !ID_LEN_RANGE.contains(&stripped.len()) {
                return Err(FieldError::IdLength {
                    len: stripped.len(),
                });
            }
            Ok(stripped)
        },
        FieldKey::NumeroSerie | FieldKey::NumeroMotor => {
            let stripped = strip_to_alnum_upper(&value);
            if stripped.len() < MIN_SERIAL_LEN {
                return Err(FieldError::SerialTooShort {
                    field,
                    min: MIN_SERIAL_LEN,
                    len: stripped.len(),
                });
            }
            Ok(stripped)
        },
        FieldKey::Email => {
            if value.len() > MAX_EMAIL_LEN || !email_regex().is_match(&value) {
                return Err(FieldError::EmailShape);
            }
            Ok(value.to_lowercase())
        },
        FieldKey::AnoModelo => {
            let year: i32 = value.parse().map_err(|_| FieldError::YearNotNumeric)?;
            let max = Utc::now().year() + 1;
            if year < MIN_MODEL_YEAR || year > max {
                return Err(FieldError::YearOutOfRange {
                    year,
                    min: MIN_MODEL_YEAR,
                    max,
                });
            }
            Ok(year.to_string())
        },
        FieldKey::Direccion | FieldKey::Marca | FieldKey::Modelo | FieldKey::Color => {
            if contains_command_injection(&value) {
                return Err(FieldError::CommandInjection { field });
            }
            if field == FieldKey::Color {
                Ok(value.replace(['/', '\\'], " y "))
            } else {
                Ok(value)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_control_and_zero_width() {
        let raw = "Mar\u{200B}ía\u{0007}  López ";
        assert_eq!(normalize(raw, FieldKey::NombreCompleto), "María  López");
    }

    #[test]
    fn normalize_truncates_to_field_maximum() {
        let raw = "a".repeat(500);
        let out = normalize(&raw, FieldKey::Color);
        assert_eq!(out.chars().count(), FieldKey::Color.max_len());
    }

    #[test]
    fn full_name_requires_two_words() {
        assert_eq!(FieldError::NameTooShort.field(), FieldKey::NombreCompleto);
        assert!(matches!(
            validate_field(FieldKey::NombreCompleto, "María"),
            Err(FieldError::NameTooShort)
        ));
        assert_eq!(
            validate_field(FieldKey::NombreCompleto, "  María   López ").unwrap(),
            "María López"
        );
        assert_eq!(
            validate_field(FieldKey::NombreCompleto, "Jean-Pierre O'Neil Jr.").unwrap(),
            "Jean-Pierre O'Neil Jr."
        );
    }

    #[test]
    fn full_name_rejects_digits_and_symbols() {
        assert!(matches!(
            validate_field(FieldKey::NombreCompleto, "María López 99"),
            Err(FieldError::NameCharset)
        ));
    }

    #[test]
    fn curp_rfc_is_stripped_and_uppercased() {
        assert_eq!(
            validate_field(FieldKey::CurpRfc, "abcd-1234 5678").unwrap(),
            "ABCD12345678"
        );
        assert!(matches!(
            validate_field(FieldKey::CurpRfc, "abc-1"),
            Err(FieldError::IdLength { len: 4 })
        ));
        assert!(validate_field(FieldKey::CurpRfc, &"a1".repeat(10)).is_err());
    }

    #[test]
    fn vin_and_engine_require_minimum_length() {
        assert_eq!(
            validate_field(FieldKey::NumeroSerie, "3n1-cn7 ad9").unwrap(),
            "3N1CN7AD9"
        );
        assert!(matches!(
            validate_field(FieldKey::NumeroMotor, "a-1"),
            Err(FieldError::SerialTooShort { len: 2, .. })
        ));
    }

    #[test]
    fn email_shape_and_length() {
        assert_eq!(
            validate_field(FieldKey::Email, "Maria.Lopez@Correo.COM").unwrap(),
            "maria.lopez@correo.com"
        );
        assert!(validate_field(FieldKey::Email, "no-arroba.com").is_err());
        assert!(validate_field(FieldKey::Email, "a@b@c.com").is_err());
        let long = format!("{}@x.com", "a".repeat(260));
        assert!(validate_field(FieldKey::Email, &long).is_err());
    }

    #[test]
    fn model_year_range() {
        assert!(matches!(
            validate_field(FieldKey::AnoModelo, "1899"),
            Err(FieldError::YearOutOfRange { year: 1899, .. })
        ));
        assert_eq!(validate_field(FieldKey::AnoModelo, "2024").unwrap(), "2024");
        assert!(validate_field(FieldKey::AnoModelo, "dosmil").is_err());
        let next_year = (Utc::now().year() + 1).to_string();
        assert!(validate_field(FieldKey::AnoModelo, &next_year).is_ok());
        let far = (Utc::now().year() + 2).to_string();
        assert!(validate_field(FieldKey::AnoModelo, &far).is_err());
    }

    #[test]
    fn color_replaces_slashes() {
        assert_eq!(
            validate_field(FieldKey::Color, "rojo/negro").unwrap(),
            "rojo y negro"
        );
    }

    #[test]
    fn command_injection_is_rejected_at_token_boundary() {
        assert!(contains_command_injection("rojo /menu"));
        assert!(contains_command_injection("/cancelar"));
        assert!(contains_command_injection("algo / menu"));
        assert!(!contains_command_injection("avenida 5/a"));
        assert!(!contains_command_injection("menu del día"));
        assert!(matches!(
            validate_field(FieldKey::Direccion, "Av. Juárez /cancelar"),
            Err(FieldError::CommandInjection { .. })
        ));
    }
}
