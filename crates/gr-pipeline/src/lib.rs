//! Grounded Report Pipeline
//!
//! Turns source records into a grounded narrative report:
//! - Validated configuration of insertion rules and policies
//! - Record source and schema validation seams
//! - Orchestration state machine with fail-fast and degraded-emit paths
//! - Document assembly, traceability ledger and validation report files
//! - Batch runs with bounded concurrency
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gr_generation::ScriptedGenerator;
//! use gr_pipeline::{JsonRecordSource, PipelineConfig, ReportPipeline};
//!
//! # async fn demo() -> Result<(), gr_pipeline::PipelineError> {
//! let config = PipelineConfig::from_yaml_file("config/report.yaml")?;
//! let source = Arc::new(JsonRecordSource::new("data/records.json"));
//! let generator = Arc::new(ScriptedGenerator::from_json_file("data/responses.json").unwrap());
//! let pipeline = ReportPipeline::new(config, source, generator)?;
//!
//! let outcome = pipeline.run("Acme").await;
//! println!("{:?} -> {:?}", outcome.status, outcome.artifacts.document);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod output;
pub mod source;
pub mod state_machine;

pub use batch::BatchSummary;
pub use config::{
    ContentType, GroundingFailureMode, InsertionRule, OutputSettings, PipelineConfig,
    RetrySettings, SchemaSettings, DEFAULT_FALLBACK_TEXT,
};
pub use document::{render_table, DocumentSink, MarkdownDocument};
pub use error::{ConfigError, PipelineError, StateMachineError};
pub use ledger::{CitationEntry, TraceabilityFile, ValidationSummary};
pub use orchestrator::{CancelFlag, ReportPipeline, RunArtifacts, RunOutcome, RunStatus};
pub use output::{output_filename, sanitize_entity, sibling_path, OutputClaim, OutputRegistry};
pub use source::{
    InMemoryRecordSource, JsonRecordSource, RecordSource, RequiredFieldsValidator, SchemaValidator,
};
pub use state_machine::{
    allowed_transitions, validate_transition, RunState, RunStateMachine, Transition,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running reports
    pub use crate::{
        InsertionRule, PipelineConfig, PipelineError, RecordSource, ReportPipeline, RunOutcome,
        RunState, RunStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
