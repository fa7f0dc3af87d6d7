//! Validation pass
//!
//! Runs extraction, grounding, consistency, hallucination and
//! traceability over a complete set of content blocks, then assembles the
//! report. Consistency needs every block, so a pass is never partial.

use crate::claims::{Claim, ClaimExtractor, ExtractorConfig};
use crate::consistency::ConsistencyChecker;
use crate::error::ValidationError;
use crate::grounding::{GroundingMatcher, GroundingVerdict};
use crate::hallucination::{HallucinationConfig, HallucinationDetector, HallucinationVerdict};
use crate::report::{ReportAssembler, ValidationPolicy, ValidationReport};
use crate::traceability::{TraceabilityBuilder, TraceabilityLedger};
use gr_core::ContentBlock;
use gr_facts::FactIndex;
use serde::{Deserialize, Serialize};

/// Configuration of every validation stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Claim extraction heuristics
    pub extraction: ExtractorConfig,
    /// Hedge patterns
    pub hallucination: HallucinationConfig,
    /// Report policy
    pub policy: ValidationPolicy,
}

/// Grounding tally of one insertion rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleGrounding {
    /// Claims extracted from the rule's blocks
    pub claims: usize,
    /// Claims with a backing fact
    pub matched: usize,
    /// Hallucinated statements in the rule's blocks
    pub hallucinations: usize,
}

impl RuleGrounding {
    /// Claims without a backing fact
    #[inline]
    #[must_use]
    pub fn unmatched(&self) -> usize {
        self.claims - self.matched
    }
}

/// Everything produced by one validation pass
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Extracted claims in block order
    pub claims: Vec<Claim>,
    /// Verdicts parallel to `claims`
    pub verdicts: Vec<GroundingVerdict>,
    /// Hallucination detector output
    pub hallucination: HallucinationVerdict,
    /// Citation ledger
    pub ledger: TraceabilityLedger,
    /// Aggregated report
    pub report: ValidationReport,
}

impl ValidationOutcome {
    /// Tally for one rule
    #[must_use]
    pub fn rule_grounding(&self, insertion_id: &str) -> RuleGrounding {
        let mut tally = RuleGrounding::default();
        for (claim, verdict) in self.claims.iter().zip(&self.verdicts) {
            if claim.block_ref.insertion_id.as_str() == insertion_id {
                tally.claims += 1;
                if verdict.matched {
                    tally.matched += 1;
                }
            }
        }
        tally.hallucinations = self.hallucination.flagged_for(insertion_id).count();
        tally
    }
}

/// All validation stages wired together
#[derive(Debug, Clone)]
pub struct Validator {
    extractor: ClaimExtractor,
    detector: HallucinationDetector,
    assembler: ReportAssembler,
}

impl Validator {
    /// Build from configuration
    ///
    /// # Errors
    /// Returns error if a hedge pattern or the threshold is invalid
    pub fn new(config: &ValidatorConfig) -> Result<Self, ValidationError> {
        config.policy.validate()?;
        Ok(Self {
            extractor: ClaimExtractor::new(&config.extraction),
            detector: HallucinationDetector::new(&config.hallucination)?,
            assembler: ReportAssembler::new(config.policy),
        })
    }

    /// Validator with default configuration
    ///
    /// # Errors
    /// Returns error if a default pattern fails to compile
    pub fn with_defaults() -> Result<Self, ValidationError> {
        Self::new(&ValidatorConfig::default())
    }

    /// Report policy in effect
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        self.assembler.policy()
    }

    /// Validate a complete set of blocks against `index`
    ///
    /// `warnings` are degradation notes collected before validation.
    #[must_use]
    pub fn validate(
        &self,
        blocks: &[ContentBlock],
        index: &FactIndex,
        warnings: Vec<String>,
    ) -> ValidationOutcome {
        let claims = self.extractor.extract_all(blocks);
        let verdicts = GroundingMatcher::new(index).match_all(&claims);
        let issues = ConsistencyChecker::new().check(&claims, &verdicts, index);
        let hallucination = self.detector.detect(blocks, &claims, &verdicts);
        let ledger = TraceabilityBuilder::new().build(blocks, &claims, &verdicts);
        let report = self.assembler.assemble(issues, &ledger, &hallucination, warnings);

        tracing::debug!(
            "Validated {} blocks: {} claims, {} citations",
            blocks.len(),
            claims.len(),
            ledger.citations.len()
        );

        ValidationOutcome {
            claims,
            verdicts,
            hallucination,
            ledger,
            report,
        }
    }
}
