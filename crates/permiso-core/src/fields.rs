//! The closed set of form fields collected by the intake dialogue.
//!
//! Every field the dialogue can collect is a [`FieldKey`] variant, so an
//! invalid field name is a compile-time error rather than a runtime typo.
//! The wire names (`nombre_completo`, `curp_rfc`, ...) are what the
//! extraction collaborator and the persisted session blob use.

use serde::{Deserialize, Serialize};

/// Grouping of fields inside the session payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    /// Applicant data (name, id documents, contact).
    Personal,
    /// Vehicle data (make, model, serial numbers).
    Vehicle,
}

/// One collectable form field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    /// Applicant full name.
    NombreCompleto,
    /// CURP or RFC national identifier.
    CurpRfc,
    /// Contact email address.
    Email,
    /// Postal address.
    Direccion,
    /// Vehicle make.
    Marca,
    /// Vehicle model.
    Modelo,
    /// Vehicle model year.
    AnoModelo,
    /// Vehicle color.
    Color,
    /// Vehicle identification number.
    NumeroSerie,
    /// Engine number.
    NumeroMotor,
}

impl FieldKey {
    /// Fixed completion order used to pick the next missing field.
    pub const ORDERED: &'static [Self] = &[
        Self::NombreCompleto,
        Self::CurpRfc,
        Self::Email,
        Self::Direccion,
        Self::Marca,
        Self::Modelo,
        Self::AnoModelo,
        Self::Color,
        Self::NumeroSerie,
        Self::NumeroMotor,
    ];

    /// Returns the wire name used in persisted blobs and the extraction
    /// contract.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NombreCompleto => "nombre_completo",
            Self::CurpRfc => "curp_rfc",
            Self::Email => "email",
            Self::Direccion => "direccion",
            Self::Marca => "marca",
            Self::Modelo => "modelo",
            Self::AnoModelo => "ano_modelo",
            Self::Color => "color",
            Self::NumeroSerie => "numero_serie",
            Self::NumeroMotor => "numero_motor",
        }
    }

    /// Parses a wire name back into a key.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ORDERED.iter().copied().find(|k| k.as_str() == name)
    }

    /// Returns which group the field belongs to.
    #[must_use]
    pub const fn group(&self) -> FieldGroup {
        match self {
            Self::NombreCompleto | Self::CurpRfc | Self::Email | Self::Direccion => {
                FieldGroup::Personal
            },
            Self::Marca
            | Self::Modelo
            | Self::AnoModelo
            | Self::Color
            | Self::NumeroSerie
            | Self::NumeroMotor => FieldGroup::Vehicle,
        }
    }

    /// Human-readable label for prompts and breadcrumbs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NombreCompleto => "nombre completo",
            Self::CurpRfc => "CURP o RFC",
            Self::Email => "correo electrónico",
            Self::Direccion => "dirección",
            Self::Marca => "marca del vehículo",
            Self::Modelo => "modelo del vehículo",
            Self::AnoModelo => "año del modelo",
            Self::Color => "color del vehículo",
            Self::NumeroSerie => "número de serie (VIN)",
            Self::NumeroMotor => "número de motor",
        }
    }

    /// Example answer surfaced when validation fails repeatedly.
    #[must_use]
    pub const fn example(&self) -> &'static str {
        match self {
            Self::NombreCompleto => "María López Hernández",
            Self::CurpRfc => "LOHM850101MDFPRR08",
            Self::Email => "maria.lopez@correo.com",
            Self::Direccion => "Av. Juárez 123, Col. Centro, Guadalajara",
            Self::Marca => "Nissan",
            Self::Modelo => "Versa",
            Self::AnoModelo => "2022",
            Self::Color => "rojo",
            Self::NumeroSerie => "3N1CN7AD9KL812345",
            Self::NumeroMotor => "HR16DE123456",
        }
    }

    /// Maximum accepted input length, in characters, before truncation.
    #[must_use]
    pub const fn max_len(&self) -> usize {
        match self {
            Self::NombreCompleto => 100,
            Self::CurpRfc => 30,
            Self::Email => 254,
            Self::Direccion => 200,
            Self::Marca | Self::Modelo => 50,
            Self::AnoModelo => 10,
            Self::Color => 30,
            Self::NumeroSerie | Self::NumeroMotor => 25,
        }
    }

    /// Returns the first field in [`Self::ORDERED`] not present in
    /// `completed`, or `None` when the form is complete.
    #[must_use]
    pub fn next_missing(completed: &std::collections::BTreeSet<Self>) -> Option<Self> {
        Self::ORDERED.iter().copied().find(|k| !completed.contains(k))
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for key in FieldKey::ORDERED {
            assert_eq!(FieldKey::from_wire(key.as_str()), Some(*key));
        }
        assert_eq!(FieldKey::from_wire("telefono"), None);
    }

    #[test]
    fn ordering_covers_every_field_once() {
        let unique: BTreeSet<_> = FieldKey::ORDERED.iter().copied().collect();
        assert_eq!(unique.len(), FieldKey::ORDERED.len());
    }

    #[test]
    fn next_missing_follows_fixed_order() {
        let mut completed = BTreeSet::new();
        assert_eq!(
            FieldKey::next_missing(&completed),
            Some(FieldKey::NombreCompleto)
        );

        completed.insert(FieldKey::NombreCompleto);
        completed.insert(FieldKey::Email);
        assert_eq!(FieldKey::next_missing(&completed), Some(FieldKey::CurpRfc));

        for key in FieldKey::ORDERED {
            completed.insert(*key);
        }
        assert_eq!(FieldKey::next_missing(&completed), None);
    }

    #[test]
    fn groups_split_personal_and_vehicle() {
        assert_eq!(FieldKey::CurpRfc.group(), FieldGroup::Personal);
        assert_eq!(FieldKey::NumeroSerie.group(), FieldGroup::Vehicle);
    }
}
