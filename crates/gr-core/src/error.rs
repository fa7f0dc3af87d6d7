//! Error types shared across the workspace
//!
//! Provides the leaf errors raised by external collaborators:
//! - Schema violations in extracted source records
//! - Failures of the text-generation service

/// Source records failed schema validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// No records exist for the requested entity
    #[error("no source records for entity `{0}`")]
    UnknownEntity(String),

    /// A required field is absent
    #[error("entity `{entity}` is missing required field `{field}`")]
    MissingField {
        /// Entity being validated
        entity: String,
        /// Field that was expected
        field: String,
    },

    /// A required field is present but empty
    #[error("entity `{entity}` has an empty value for required field `{field}`")]
    EmptyField {
        /// Entity being validated
        entity: String,
        /// Field that was empty
        field: String,
    },
}

/// Error returned by the text-generation collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Provider rejected the call due to rate limits
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Call did not complete in time
    #[error("generation timed out after {duration_secs}s")]
    Timeout {
        /// Elapsed seconds before giving up
        duration_secs: u64,
    },

    /// Credentials were rejected
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Provider answered with something unusable
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Transient failures worth retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout { .. })
    }
}
