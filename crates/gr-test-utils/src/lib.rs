//! Testing utilities for the grounded report workspace
//!
//! Shared fixtures: source records, a report template and a scripted
//! generator with responses that ground against those records.

#![allow(missing_docs)]

use gr_core::{SourceAddress, SourceRecord};
use gr_generation::ScriptedGenerator;
use std::path::{Path, PathBuf};

pub const ENTITY: &str = "Acme";
pub const SOURCE_FILE: &str = "impact.xlsx";

pub const TEMPLATE: &str = "\
# Impact Report

## Overview

## Impact Summary

## Mechanisms

## Risks

## Sources
";

/// Records of one entity, one per row of a single sheet
pub struct RecordBuilder {
    entity: String,
    sheet: String,
    records: Vec<SourceRecord>,
}

impl RecordBuilder {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            sheet: "2024".to_string(),
            records: Vec::new(),
        }
    }

    fn address(&self, column: &str) -> SourceAddress {
        SourceAddress::new(SOURCE_FILE)
            .with_sheet(self.sheet.as_str())
            .with_row(u32::try_from(self.records.len() + 2).unwrap())
            .with_column(column)
    }

    pub fn text(mut self, field: &str, value: &str) -> Self {
        let record = SourceRecord::new(self.address(field), self.entity.as_str(), field, value);
        self.records.push(record);
        self
    }

    pub fn number(mut self, field: &str, value: f64, unit: Option<&str>) -> Self {
        let mut record = SourceRecord::new(self.address(field), self.entity.as_str(), field, value);
        if let Some(unit) = unit {
            record = record.with_unit(unit);
        }
        self.records.push(record);
        self
    }

    pub fn build(self) -> Vec<SourceRecord> {
        self.records
    }
}

/// Acme: name, sector, people served and two mechanisms
pub fn acme_records() -> Vec<SourceRecord> {
    RecordBuilder::new(ENTITY)
        .text("company_name", "Acme Corp")
        .text("sector", "Water")
        .number("people_served", 1000.0, Some("people"))
        .text("mechanism", "Clean water")
        .text("mechanism", "Hygiene training")
        .build()
}

/// Acme plus a second entity with its own figures
pub fn two_entity_records() -> Vec<SourceRecord> {
    let mut records = acme_records();
    records.extend(
        RecordBuilder::new("Globex")
            .text("company_name", "Globex Ltd")
            .text("sector", "Energy")
            .number("people_served", 250.0, Some("people"))
            .text("mechanism", "Solar kits")
            .build(),
    );
    records
}

/// Responses that ground fully against [`acme_records`]
pub fn grounded_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .with_response("Acme/summary", "Acme Corp served 1000 people.")
        .with_response("Globex/summary", "Globex Ltd served 250 people.")
}

/// A response claiming a figure absent from the records
pub fn ungrounded_generator() -> ScriptedGenerator {
    ScriptedGenerator::new().with_response("summary", "Acme Corp helped 5000 teachers.")
}

pub fn write_template(dir: &Path) -> PathBuf {
    let path = dir.join("template.md");
    std::fs::write(&path, TEMPLATE).unwrap();
    path
}

pub fn write_records(dir: &Path, records: &[SourceRecord]) -> PathBuf {
    let path = dir.join("records.json");
    std::fs::write(&path, serde_json::to_string_pretty(records).unwrap()).unwrap();
    path
}
