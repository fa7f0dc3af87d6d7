//! Grounded Report Validation
//!
//! The grounding subsystem:
//! - Extracts numeric and entity claims from generated text
//! - Matches claims against the source fact index
//! - Flags divergent renderings of the same fact across blocks
//! - Flags ungrounded and hedge-phrase statements
//! - Builds the citation ledger and traceability rate
//! - Assembles the pass/fail validation report
//!
//! # Example
//!
//! ```rust
//! use gr_core::{ContentBlock, SourceAddress, SourceRecord};
//! use gr_facts::FactIndex;
//! use gr_validation::{OverallStatus, Validator};
//!
//! let records = vec![
//!     SourceRecord::new(SourceAddress::new("impact.xlsx").with_row(2), "Acme", "served", 1000.0)
//!         .with_unit("people"),
//! ];
//! let index = FactIndex::build(&records);
//! let blocks = vec![ContentBlock::generated("summary", "Acme served 1000 people.").with_subject("Acme")];
//!
//! let outcome = Validator::with_defaults().unwrap().validate(&blocks, &index, vec![]);
//! assert_eq!(outcome.ledger.traceability_rate, 1.0);
//! assert_eq!(outcome.report.overall_status, OverallStatus::Pass);
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod claims;
pub mod consistency;
pub mod error;
pub mod grounding;
pub mod hallucination;
pub mod report;
pub mod text;
pub mod traceability;
pub mod validator;

pub use claims::{Claim, ClaimExtractor, ClaimType, ExtractorConfig};
pub use consistency::{ConsistencyChecker, ConsistencyIssue, IssueKey, Occurrence};
pub use error::ValidationError;
pub use grounding::{ground, GroundingMatcher, GroundingVerdict};
pub use hallucination::{
    FlaggedStatement, HallucinationConfig, HallucinationDetector, HallucinationReason,
    HallucinationVerdict, DEFAULT_HEDGE_PATTERNS,
};
pub use report::{
    MandatoryChecks, OverallStatus, ReportAssembler, ValidationPolicy, ValidationReport,
};
pub use traceability::{Citation, TraceabilityBuilder, TraceabilityLedger, UntraceableItem};
pub use validator::{RuleGrounding, ValidationOutcome, Validator, ValidatorConfig};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a validation pass
    pub use crate::{
        Claim, ConsistencyIssue, GroundingVerdict, HallucinationVerdict, OverallStatus,
        TraceabilityLedger, ValidationOutcome, ValidationPolicy, ValidationReport, Validator,
        ValidatorConfig,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
