//! Grounded Report Generation
//!
//! Everything around the call to the text-generation service:
//! - The [`TextGenerator`] contract and a scripted implementation
//! - A standalone retry/backoff policy
//! - Prompt contexts and `{field}` templates
//! - Per-stage metrics with token cost estimates
//!
//! # Example
//!
//! ```rust
//! use gr_generation::{render, PromptContext};
//!
//! let ctx = PromptContext::new("Acme", "summary").with_field("served", "1000");
//! let prompt = render("Summarise {entity}: {served} people served.", &ctx).unwrap();
//! assert_eq!(prompt, "Summarise Acme: 1000 people served.");
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod error;
pub mod generator;
pub mod metrics;
pub mod prompt;
pub mod retry;

pub use error::{ScriptError, TemplateError};
pub use generator::{estimate_tokens, GenerationOutput, ScriptedGenerator, TextGenerator};
pub use metrics::{RunMetrics, StageMetrics, StageTimer, TokenPricing};
pub use prompt::{
    is_builtin, placeholders, render, DataSourceStatus, PromptContext, DATA_STATUS_PLACEHOLDER,
    ENTITY_PLACEHOLDER,
};
pub use retry::{RetryOutcome, RetryPolicy, RetryPredicate, RetryingGenerator};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving generation
    pub use crate::{
        GenerationOutput, PromptContext, RetryPolicy, RetryingGenerator, RunMetrics,
        StageMetrics, StageTimer, TextGenerator,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
