//! Errors raised outside the generation call itself
//!
//! - Malformed or unresolvable prompt templates
//! - Unreadable generation scripts

use std::path::PathBuf;

/// Prompt template could not be parsed or rendered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// `{` without a closing `}`
    #[error("unclosed placeholder starting at byte {offset}")]
    UnclosedPlaceholder {
        /// Byte offset of the opening brace
        offset: usize,
    },

    /// `}` that neither closes a placeholder nor is escaped as `}}`
    #[error("unmatched `}}` at byte {offset}")]
    UnmatchedBrace {
        /// Byte offset of the brace
        offset: usize,
    },

    /// `{}` or a placeholder with characters outside `[A-Za-z0-9_]`
    #[error("invalid placeholder `{name}` at byte {offset}")]
    InvalidPlaceholder {
        /// Text between the braces
        name: String,
        /// Byte offset of the opening brace
        offset: usize,
    },

    /// Placeholder names no value in the prompt context
    #[error("no value for placeholder `{0}`")]
    UnknownPlaceholder(String),
}

/// Scripted generator fixture could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Fixture file unreadable
    #[error("cannot read generation script {path}: {source}")]
    Io {
        /// Fixture path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Fixture is not a JSON object of strings
    #[error("invalid generation script: {0}")]
    Parse(#[from] serde_json::Error),
}
