//! Record sources and schema validation
//!
//! Parsing the tabular source files happens upstream. The pipeline sees
//! records through [`RecordSource`] and checks them through
//! [`SchemaValidator`] before anything is generated.

use crate::error::PipelineError;
use gr_core::{SchemaError, SourceRecord};
use indexmap::IndexSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Supplies source records
///
/// Sources are shared read-only between concurrent runs.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Records owned by `entity`, in source order
    ///
    /// # Errors
    /// Returns error if the underlying input is missing or unreadable
    async fn load(&self, entity: &str) -> Result<Vec<SourceRecord>, PipelineError>;

    /// Entity names in first-seen order
    ///
    /// # Errors
    /// Returns error if the underlying input is missing or unreadable
    async fn entities(&self) -> Result<Vec<String>, PipelineError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "records"
    }
}

fn owned_by<'a>(
    records: impl IntoIterator<Item = &'a SourceRecord>,
    entity: &str,
) -> Vec<SourceRecord> {
    let entity = entity.trim();
    records
        .into_iter()
        .filter(|r| r.owning_entity.trim() == entity)
        .cloned()
        .collect()
}

fn entity_names<'a>(records: impl IntoIterator<Item = &'a SourceRecord>) -> Vec<String> {
    records
        .into_iter()
        .map(|r| r.owning_entity.trim().to_string())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Arc<Vec<SourceRecord>>,
}

impl InMemoryRecordSource {
    /// Wrap a record set
    #[must_use]
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }
}

#[async_trait::async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn load(&self, entity: &str) -> Result<Vec<SourceRecord>, PipelineError> {
        Ok(owned_by(self.records.iter(), entity))
    }

    async fn entities(&self) -> Result<Vec<String>, PipelineError> {
        Ok(entity_names(self.records.iter()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Records read from a JSON array file
///
/// The file is re-read on every call, so concurrent runs never share
/// mutable state.
#[derive(Debug, Clone)]
pub struct JsonRecordSource {
    path: PathBuf,
}

impl JsonRecordSource {
    /// Source backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<Vec<SourceRecord>, PipelineError> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PipelineError::io(&self.path, e))?;
        let records: Vec<SourceRecord> = serde_json::from_str(&json)?;
        tracing::debug!("Read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

#[async_trait::async_trait]
impl RecordSource for JsonRecordSource {
    async fn load(&self, entity: &str) -> Result<Vec<SourceRecord>, PipelineError> {
        let records = self.read_all().await?;
        Ok(owned_by(&records, entity))
    }

    async fn entities(&self) -> Result<Vec<String>, PipelineError> {
        let records = self.read_all().await?;
        Ok(entity_names(&records))
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Checks extracted records before generation
pub trait SchemaValidator: Send + Sync {
    /// Validate the records of one entity
    ///
    /// # Errors
    /// Returns the first schema violation
    fn validate(&self, entity: &str, records: &[SourceRecord]) -> Result<(), SchemaError>;
}

/// Requires a non-empty record for each listed field
#[derive(Debug, Clone, Default)]
pub struct RequiredFieldsValidator {
    required: Vec<String>,
}

impl RequiredFieldsValidator {
    /// Require `fields`
    #[must_use]
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Required field names
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }
}

impl SchemaValidator for RequiredFieldsValidator {
    fn validate(&self, entity: &str, records: &[SourceRecord]) -> Result<(), SchemaError> {
        if records.is_empty() {
            return Err(SchemaError::UnknownEntity(entity.to_string()));
        }
        for field in &self.required {
            let mut values = records.iter().filter(|r| &r.field_name == field).peekable();
            if values.peek().is_none() {
                return Err(SchemaError::MissingField {
                    entity: entity.to_string(),
                    field: field.clone(),
                });
            }
            if values.all(|r| r.value.is_blank()) {
                return Err(SchemaError::EmptyField {
                    entity: entity.to_string(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_core::SourceAddress;
    use std::io::Write;

    fn record(entity: &str, field: &str, value: &str) -> SourceRecord {
        SourceRecord::new(SourceAddress::new("impact.xlsx"), entity, field, value)
    }

    #[tokio::test]
    async fn memory_source_filters_by_entity() {
        let source = InMemoryRecordSource::new(vec![
            record("Acme", "sector", "Water"),
            record("Globex", "sector", "Energy"),
            record(" Acme ", "served", "1000"),
        ]);
        assert_eq!(source.load("Acme").await.unwrap().len(), 2);
        assert_eq!(source.entities().await.unwrap(), vec!["Acme", "Globex"]);
    }

    #[tokio::test]
    async fn json_source_reads_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"address": {{"file": "impact.xlsx", "sheet": "2024", "row": 2, "column": "C"}},
                  "field_name": "served", "owning_entity": "Acme", "value": 1000, "unit": "people"}},
                {{"address": {{"file": "impact.xlsx"}},
                  "field_name": "sector", "owning_entity": "Acme", "value": "Water"}}
            ]"#
        )
        .unwrap();

        let source = JsonRecordSource::new(file.path());
        let records = source.load("Acme").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].unit.as_deref(), Some("people"));
        assert_eq!(records[0].address.row, Some(2));
    }

    #[tokio::test]
    async fn missing_json_file_is_source_not_found() {
        let source = JsonRecordSource::new("/definitely/not/here.json");
        let err = source.load("Acme").await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }

    #[test]
    fn required_fields_are_enforced() {
        let validator = RequiredFieldsValidator::new(["sector", "served"]);
        let records = vec![record("Acme", "sector", "Water")];
        assert_eq!(
            validator.validate("Acme", &records),
            Err(SchemaError::MissingField {
                entity: "Acme".into(),
                field: "served".into(),
            })
        );

        let records = vec![record("Acme", "sector", "Water"), record("Acme", "served", "  ")];
        assert!(matches!(
            validator.validate("Acme", &records),
            Err(SchemaError::EmptyField { .. })
        ));

        assert_eq!(
            validator.validate("Nobody", &[]),
            Err(SchemaError::UnknownEntity("Nobody".into()))
        );
    }
}
