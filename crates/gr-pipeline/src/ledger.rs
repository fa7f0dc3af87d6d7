//! Traceability ledger file
//!
//! The JSON artifact written next to each report: every citation with its
//! flattened source address plus a validation summary.

use chrono::{DateTime, Utc};
use gr_validation::TraceabilityLedger;
use serde::{Deserialize, Serialize};

/// One citation as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationEntry {
    /// Sentence containing the claim
    pub statement: String,
    /// Source file
    pub source_file: String,
    /// Sheet or table
    pub source_sheet: Option<String>,
    /// Row number
    pub source_row: Option<u32>,
    /// Column
    pub source_column: Option<String>,
    /// Value as it appears in the source
    pub extracted_value: String,
    /// Match confidence
    pub confidence: f64,
    /// Rule that produced the statement
    pub insertion_id: String,
}

/// Summary block of the ledger file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Traced / total claims
    pub traceability_rate: f64,
    /// Claims extracted from factual blocks
    pub total_values: usize,
    /// Claims with a citation
    pub traceable_values: usize,
    /// Unmatched claim spans, prefixed with their rule
    pub untraceable_items: Vec<String>,
}

/// Traceability ledger file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilityFile {
    /// Report subject
    #[serde(rename = "company_name")]
    pub entity: String,
    /// Write time
    pub generated_at: DateTime<Utc>,
    /// Number of citations
    pub total_citations: usize,
    /// Citations in block, then claim order
    pub citations: Vec<CitationEntry>,
    /// Traceability summary
    pub validation_summary: ValidationSummary,
}

impl TraceabilityFile {
    /// Flatten a ledger for `entity`
    #[must_use]
    pub fn from_ledger(entity: &str, ledger: &TraceabilityLedger, generated_at: DateTime<Utc>) -> Self {
        let citations: Vec<CitationEntry> = ledger
            .citations
            .iter()
            .map(|c| CitationEntry {
                statement: c.statement.clone(),
                source_file: c.source_address.file.clone(),
                source_sheet: c.source_address.sheet.clone(),
                source_row: c.source_address.row,
                source_column: c.source_address.column.clone(),
                extracted_value: c.extracted_value.clone(),
                confidence: c.confidence,
                insertion_id: c.insertion_id.to_string(),
            })
            .collect();

        Self {
            entity: entity.to_string(),
            generated_at,
            total_citations: citations.len(),
            citations,
            validation_summary: ValidationSummary {
                traceability_rate: ledger.traceability_rate,
                total_values: ledger.total_claims,
                traceable_values: ledger.matched_claims,
                untraceable_items: ledger
                    .untraceable
                    .iter()
                    .map(|u| format!("{}: {}", u.insertion_id, u.span))
                    .collect(),
            },
        }
    }

    /// Pretty JSON
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
