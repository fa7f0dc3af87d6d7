//! Source records
//!
//! A [`SourceRecord`] is one addressable field pulled out of the tabular
//! source dataset by the extraction collaborator. Records are immutable
//! once extracted and shared read-only for the lifetime of a run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Location of a value inside the source dataset
///
/// Opaque to the grounding core beyond equality, hashing and
/// serialization. Rendered as `file[!sheet][:row][:column]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceAddress {
    /// Source file name
    pub file: String,
    /// Sheet or table inside the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// 1-based row number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    /// Column name or letter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl SourceAddress {
    /// Address pointing at a whole file
    #[inline]
    #[must_use]
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            sheet: None,
            row: None,
            column: None,
        }
    }

    /// Set sheet
    #[inline]
    #[must_use]
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Set row
    #[inline]
    #[must_use]
    pub fn with_row(mut self, row: u32) -> Self {
        self.row = Some(row);
        self
    }

    /// Set column
    #[inline]
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl Display for SourceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file)?;
        if let Some(sheet) = &self.sheet {
            write!(f, "!{sheet}")?;
        }
        if let Some(row) = self.row {
            write!(f, ":{row}")?;
        }
        if let Some(column) = &self.column {
            write!(f, ":{column}")?;
        }
        Ok(())
    }
}

/// Typed cell value
///
/// Deserializes untagged: JSON numbers become [`FieldValue::Number`],
/// ISO dates become [`FieldValue::Date`], everything else is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric cell
    Number(f64),
    /// Date cell
    Date(NaiveDate),
    /// Free text cell
    Text(String),
}

impl FieldValue {
    /// Type name used in schema diagnostics
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Date(_) => "date",
            Self::Text(_) => "text",
        }
    }

    /// True for empty or whitespace-only text
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// One addressable field of the source dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Where the value lives
    pub address: SourceAddress,
    /// Logical field name (e.g. `beneficiaries`)
    pub field_name: String,
    /// Entity the field belongs to (e.g. a company)
    pub owning_entity: String,
    /// Typed value
    pub value: FieldValue,
    /// Optional unit carried by the source column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl SourceRecord {
    /// Create a record without a unit
    #[must_use]
    pub fn new(
        address: SourceAddress,
        owning_entity: impl Into<String>,
        field_name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            address,
            field_name: field_name.into(),
            owning_entity: owning_entity.into(),
            value: value.into(),
            unit: None,
        }
    }

    /// Attach a unit
    #[inline]
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_includes_present_parts() {
        let addr = SourceAddress::new("impact.xlsx")
            .with_sheet("2024")
            .with_row(7)
            .with_column("C");
        assert_eq!(addr.to_string(), "impact.xlsx!2024:7:C");
        assert_eq!(SourceAddress::new("a.csv").to_string(), "a.csv");
    }

    #[test]
    fn field_value_deserializes_untagged() {
        let n: FieldValue = serde_json::from_str("1000").unwrap();
        assert_eq!(n, FieldValue::Number(1000.0));

        let d: FieldValue = serde_json::from_str("\"2024-03-01\"").unwrap();
        assert_eq!(d.type_name(), "date");

        let t: FieldValue = serde_json::from_str("\"Acme Corp\"").unwrap();
        assert_eq!(t, FieldValue::Text("Acme Corp".into()));
    }

    #[test]
    fn record_json_roundtrip_keeps_unit() {
        let record = SourceRecord::new(SourceAddress::new("a.csv").with_row(2), "Acme", "served", 1000_i64)
            .with_unit("people");
        let json = serde_json::to_string(&record).unwrap();
        let back: SourceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn blank_text_detected() {
        assert!(FieldValue::from("  ").is_blank());
        assert!(!FieldValue::from(0.0).is_blank());
    }
}
