//! Normalized facts
//!
//! A [`Fact`] is the comparable form of one [`SourceRecord`]. Numbers,
//! numeric-looking text and percentages become numeric facts; everything
//! else (including dates) becomes a text fact.

use crate::normalize::{
    canonical_number, normalize_date, normalize_number, normalize_text, normalize_unit,
    split_percent,
};
use gr_core::{FieldValue, SourceAddress, SourceRecord};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Fact classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// Canonical number
    Numeric,
    /// Case-folded text
    Text,
}

impl Display for FactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => f.write_str("numeric"),
            Self::Text => f.write_str("text"),
        }
    }
}

/// A normalized, addressable unit derived from one source record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// Numeric or text
    pub kind: FactKind,
    /// Comparison form
    pub normalized_value: String,
    /// Value as it appears in the source, for display
    pub display_value: String,
    /// Normalized unit, when the source carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Entity the record belongs to (original casing)
    pub owning_entity: String,
    /// Source field name
    pub field_name: String,
    /// Exact source location
    pub source_address: SourceAddress,
}

impl Fact {
    /// Normalize a record into a fact
    ///
    /// Returns `None` for values that have no comparable form
    /// (blank text, NaN, infinities).
    #[must_use]
    pub fn from_record(record: &SourceRecord) -> Option<Self> {
        let record_unit = record
            .unit
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(normalize_unit);

        let (kind, normalized_value, display_value, unit) = match &record.value {
            FieldValue::Number(n) => {
                let canonical = canonical_number(*n)?;
                (FactKind::Numeric, canonical.clone(), canonical, record_unit)
            }
            FieldValue::Date(d) => {
                let iso = normalize_date(*d);
                (FactKind::Text, iso.clone(), iso, None)
            }
            FieldValue::Text(s) => {
                let display = s.trim().to_string();
                if display.is_empty() {
                    return None;
                }
                let (number_part, percent) = split_percent(&display);
                match normalize_number(number_part) {
                    Some(canonical) => {
                        let unit = percent.map(str::to_string).or(record_unit);
                        (FactKind::Numeric, canonical, display, unit)
                    }
                    None => (FactKind::Text, normalize_text(&display), display, None),
                }
            }
        };

        Some(Self {
            kind,
            normalized_value,
            display_value,
            unit,
            owning_entity: record.owning_entity.trim().to_string(),
            field_name: record.field_name.clone(),
            source_address: record.address.clone(),
        })
    }

    /// Index key of this fact
    #[must_use]
    pub fn key(&self) -> FactKey {
        FactKey::new(&self.owning_entity, self.normalized_value.clone(), self.kind)
    }
}

/// `(owning_entity, normalized_value, kind)` lookup key
///
/// The entity is stored case-folded so lookups are insensitive to how
/// the entity name was capitalised in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
    /// Case-folded owning entity
    pub owning_entity: String,
    /// Normalized value
    pub normalized_value: String,
    /// Fact kind
    pub kind: FactKind,
}

impl FactKey {
    /// Build a key, folding the entity name
    #[must_use]
    pub fn new(owning_entity: &str, normalized_value: impl Into<String>, kind: FactKind) -> Self {
        Self {
            owning_entity: normalize_text(owning_entity),
            normalized_value: normalized_value.into(),
            kind,
        }
    }
}

impl Display for FactKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.kind, self.owning_entity, self.normalized_value)
    }
}
