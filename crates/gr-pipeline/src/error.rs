//! Error types for the report pipeline
//!
//! Provides error handling for:
//! - Schema and missing-input failures during extraction
//! - Generation failures after retries
//! - Blocking grounding and hallucination failures
//! - Configuration, I/O and artifact ownership problems

use crate::state_machine::RunState;
use gr_core::{GenerationError, SchemaError};
use gr_generation::TemplateError;
use gr_validation::ValidationError;
use std::path::PathBuf;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Source records failed schema validation
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Template or source file does not exist
    #[error("source not found: {}", path.display())]
    SourceNotFound {
        /// Missing path
        path: PathBuf,
    },

    /// Generator failed after retries
    #[error("generation failed for rule `{rule}`: {source}")]
    Generation {
        /// Rule being generated
        rule: String,
        /// Last generator error
        #[source]
        source: GenerationError,
    },

    /// Prompt or template could not be rendered
    #[error("cannot render rule `{rule}`: {source}")]
    Render {
        /// Rule being rendered
        rule: String,
        /// Template problem
        #[source]
        source: TemplateError,
    },

    /// Mandatory grounded rule has unmatched claims
    #[error("grounding failure in rule `{rule}`: {detail}")]
    GroundingFailure {
        /// Offending rule
        rule: String,
        /// Matched vs total claims
        detail: String,
    },

    /// Hallucination in a rule configured as blocking
    #[error("{count} hallucinated statement(s) in rule `{rule}`")]
    HallucinationDetected {
        /// Offending rule
        rule: String,
        /// Flagged statements
        count: usize,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem failure
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON input or output
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Illegal run state transition
    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Another run owns the output path
    #[error("output path already claimed: {}", .0.display())]
    OutputClaimed(PathBuf),

    /// Run cancelled at a stage boundary
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// True when the run stops before any artifact is written
    ///
    /// Blocking grounding and hallucination failures still allow a
    /// flagged document to be emitted.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::GroundingFailure { .. } | Self::HallucinationDetected { .. }
        )
    }

    /// I/O error helper mapping `NotFound` to [`PipelineError::SourceNotFound`]
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::SourceNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Configuration rejected at load time
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// YAML could not be parsed
    #[error("cannot parse configuration: {0}")]
    Parse(String),

    /// Configuration file unreadable
    #[error("cannot read configuration {}: {source}", path.display())]
    Io {
        /// Configuration path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Rule id or anchor is blank
    #[error("rule #{index} has an empty {what}")]
    EmptyValue {
        /// Position of the rule
        index: usize,
        /// `id` or `anchor`
        what: &'static str,
    },

    /// Two rules share an id
    #[error("duplicate rule id `{0}`")]
    DuplicateRule(String),

    /// Two rules share an anchor
    #[error("duplicate anchor `{0}`")]
    DuplicateAnchor(String),

    /// Rule lacks the text its content type needs
    #[error("rule `{rule}` requires `{field}`")]
    MissingSetting {
        /// Offending rule
        rule: String,
        /// Missing setting name
        field: &'static str,
    },

    /// Prompt or template is malformed
    #[error("rule `{rule}` has an invalid template: {source}")]
    Template {
        /// Offending rule
        rule: String,
        /// Parse error
        #[source]
        source: TemplateError,
    },

    /// Placeholder names neither a declared field nor a built-in
    #[error("rule `{rule}` references undeclared field `{placeholder}`")]
    UndeclaredField {
        /// Offending rule
        rule: String,
        /// Placeholder name
        placeholder: String,
    },

    /// Output filename pattern uses an unknown placeholder
    #[error("invalid filename pattern `{0}`")]
    FilenamePattern(String),

    /// Retry settings out of range
    #[error("invalid retry settings: {0}")]
    Retry(String),

    /// Validation policy or hedge patterns rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Run state machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not permitted from the current state
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: RunState,
        /// Requested state
        to: RunState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounding_failures_are_not_fatal() {
        let err = PipelineError::GroundingFailure {
            rule: "summary".into(),
            detail: "0 of 2 claims grounded".into(),
        };
        assert!(!err.is_fatal());
        assert!(PipelineError::Cancelled.is_fatal());
    }

    #[test]
    fn missing_files_map_to_source_not_found() {
        let err = PipelineError::io(
            "template.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
        assert_eq!(err.to_string(), "source not found: template.md");
    }
}
