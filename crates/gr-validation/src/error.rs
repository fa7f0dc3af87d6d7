//! Validation errors
//!
//! Validation itself never fails: issues are data in the report. These
//! errors cover invalid validation configuration only.

/// Invalid validation configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A hedge pattern failed to compile
    #[error("invalid hedge pattern: {0}")]
    InvalidPattern(String),

    /// Threshold outside `[0, 1]`
    #[error("traceability threshold must be within [0, 1], got {0}")]
    InvalidThreshold(String),
}
