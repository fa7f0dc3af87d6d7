//! Validation report assembly
//!
//! Combines consistency, traceability and hallucination outputs into one
//! [`ValidationReport`]. Status rules:
//! - `FAIL` if any mandatory check fails
//! - `PASS_WITH_WARNINGS` if a non-mandatory check fails or a degradation
//!   warning was recorded
//! - `PASS` otherwise
//!
//! Reports carry no timestamps, so identical inputs render byte-identical
//! text.

use crate::consistency::ConsistencyIssue;
use crate::error::ValidationError;
use crate::hallucination::{FlaggedStatement, HallucinationReason, HallucinationVerdict};
use crate::traceability::{TraceabilityLedger, UntraceableItem};
use gr_core::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter, Write as _};

/// Aggregate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    /// Every check passed, no warnings
    Pass,
    /// Only non-mandatory issues
    PassWithWarnings,
    /// A mandatory check failed
    Fail,
}

impl OverallStatus {
    /// True unless `Fail`
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Fail)
    }
}

impl Display for OverallStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::PassWithWarnings => f.write_str("PASS_WITH_WARNINGS"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

/// Which checks fail the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MandatoryChecks {
    /// Consistency issues fail the report
    pub consistency: bool,
    /// Traceability below threshold fails the report
    pub traceability: bool,
    /// Any hallucination fails the report
    pub hallucination: bool,
}

impl Default for MandatoryChecks {
    fn default() -> Self {
        Self {
            consistency: false,
            traceability: true,
            hallucination: false,
        }
    }
}

/// Report policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Minimum traceability rate
    pub traceability_threshold: f64,
    /// Checks that fail the report
    pub mandatory: MandatoryChecks,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            traceability_threshold: 0.8,
            mandatory: MandatoryChecks::default(),
        }
    }
}

impl ValidationPolicy {
    /// Create default policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set traceability threshold
    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.traceability_threshold = threshold;
        self
    }

    /// Set mandatory checks
    #[inline]
    #[must_use]
    pub fn with_mandatory(mut self, mandatory: MandatoryChecks) -> Self {
        self.mandatory = mandatory;
        self
    }

    /// Check the threshold range
    ///
    /// # Errors
    /// Returns error if the threshold is outside `[0, 1]` or not a number
    pub fn validate(&self) -> Result<(), ValidationError> {
        if (0.0..=1.0).contains(&self.traceability_threshold) {
            Ok(())
        } else {
            Err(ValidationError::InvalidThreshold(
                self.traceability_threshold.to_string(),
            ))
        }
    }
}

/// Consistency section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencySection {
    /// No issues found
    pub passed: bool,
    /// Failing this check fails the report
    pub mandatory: bool,
    /// Issue count
    pub issue_count: usize,
    /// Issues
    pub issues: Vec<ConsistencyIssue>,
}

/// Traceability section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilitySection {
    /// Rate at or above threshold
    pub passed: bool,
    /// Failing this check fails the report
    pub mandatory: bool,
    /// Traceability rate
    pub rate: f64,
    /// Threshold applied
    pub threshold: f64,
    /// Claims considered
    pub total_claims: usize,
    /// Claims with a citation
    pub matched_claims: usize,
    /// Claims without a citation
    pub untraceable: Vec<UntraceableItem>,
}

/// Hallucination section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationSection {
    /// No statement flagged
    pub passed: bool,
    /// Failing this check fails the report
    pub mandatory: bool,
    /// Statements considered
    pub total_statements: usize,
    /// Statements flagged
    pub hallucination_count: usize,
    /// Flagged share of statements
    pub rate: f64,
    /// Flagged statements
    pub flagged: Vec<FlaggedStatement>,
}

/// Aggregated validation verdicts for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Aggregate verdict
    pub overall_status: OverallStatus,
    /// Consistency check
    pub consistency: ConsistencySection,
    /// Traceability check
    pub traceability: TraceabilitySection,
    /// Hallucination check
    pub hallucination: HallucinationSection,
    /// Degradation warnings (fallbacks, missing anchors, truncation)
    pub warnings: Vec<String>,
    /// Per-rule blocking failures raised after assembly
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking_failures: Vec<String>,
}

impl ValidationReport {
    /// Human-readable report
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Validation Report\n=================\n\n");

        let c = &self.consistency;
        let _ = writeln!(out, "[1] Consistency: {}", section_status(c.passed, c.mandatory));
        let _ = writeln!(out, "    issues: {}", c.issue_count);
        for issue in &c.issues {
            let renderings: Vec<String> = issue
                .occurrences
                .iter()
                .map(|o| format!("\"{}\" ({})", o.raw_span, o.block_ref))
                .collect();
            let _ = writeln!(out, "    - {}: {}", issue.fact_key, renderings.join(", "));
        }

        let t = &self.traceability;
        let _ = writeln!(out, "\n[2] Traceability: {}", section_status(t.passed, t.mandatory));
        let _ = writeln!(
            out,
            "    rate: {:.1}% (threshold {:.1}%)",
            t.rate * 100.0,
            t.threshold * 100.0
        );
        let _ = writeln!(
            out,
            "    claims: {}, traced: {}, untraceable: {}",
            t.total_claims,
            t.matched_claims,
            t.untraceable.len()
        );
        for item in &t.untraceable {
            let _ = writeln!(out, "    - {}: {}", item.insertion_id, item.span);
        }

        let h = &self.hallucination;
        let _ = writeln!(out, "\n[3] Hallucination: {}", section_status(h.passed, h.mandatory));
        let _ = writeln!(
            out,
            "    statements: {}, hallucinated: {} ({:.1}%)",
            h.total_statements,
            h.hallucination_count,
            h.rate * 100.0
        );
        for statement in &h.flagged {
            let reasons: Vec<String> = statement.reasons.iter().map(describe_reason).collect();
            let _ = writeln!(
                out,
                "    - {}: \"{}\" [{}]",
                statement.block_ref,
                statement.text,
                reasons.join("; ")
            );
        }

        if !self.blocking_failures.is_empty() {
            out.push_str("\nBlocking failures:\n");
            for failure in &self.blocking_failures {
                let _ = writeln!(out, "    - {failure}");
            }
        }

        if !self.warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                let _ = writeln!(out, "    - {warning}");
            }
        }

        let _ = writeln!(out, "\nOverall: {}", self.overall_status);
        out
    }

    /// Record a blocking rule failure; the report becomes `FAIL`
    pub fn record_blocking_failure(&mut self, reason: impl Into<String>) {
        self.blocking_failures.push(reason.into());
        self.overall_status = OverallStatus::Fail;
    }

    /// Pretty JSON form
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Fingerprint of the rendered text
    #[must_use]
    pub fn fingerprint(&self) -> ContentHash {
        ContentHash::compute(self.render_text().as_bytes())
    }
}

fn section_status(passed: bool, mandatory: bool) -> &'static str {
    match (passed, mandatory) {
        (true, _) => "PASS",
        (false, true) => "FAIL",
        (false, false) => "WARN",
    }
}

fn describe_reason(reason: &HallucinationReason) -> String {
    match reason {
        HallucinationReason::UngroundedClaim { span } => format!("ungrounded claim '{span}'"),
        HallucinationReason::HedgePhrase { pattern } => format!("hedge phrase /{pattern}/"),
    }
}

/// Combines check outputs into a report
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAssembler {
    policy: ValidationPolicy,
}

impl ReportAssembler {
    /// Assembler applying `policy`
    #[inline]
    #[must_use]
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// Policy in effect
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Build the report
    #[must_use]
    pub fn assemble(
        &self,
        consistency: Vec<ConsistencyIssue>,
        traceability: &TraceabilityLedger,
        hallucination: &HallucinationVerdict,
        warnings: Vec<String>,
    ) -> ValidationReport {
        let mandatory = self.policy.mandatory;

        let consistency = ConsistencySection {
            passed: consistency.is_empty(),
            mandatory: mandatory.consistency,
            issue_count: consistency.len(),
            issues: consistency,
        };
        let traceability = TraceabilitySection {
            passed: traceability.traceability_rate >= self.policy.traceability_threshold,
            mandatory: mandatory.traceability,
            rate: traceability.traceability_rate,
            threshold: self.policy.traceability_threshold,
            total_claims: traceability.total_claims,
            matched_claims: traceability.matched_claims,
            untraceable: traceability.untraceable.clone(),
        };
        let hallucination = HallucinationSection {
            passed: hallucination.flagged.is_empty(),
            mandatory: mandatory.hallucination,
            total_statements: hallucination.total_statements,
            hallucination_count: hallucination.hallucination_count(),
            rate: hallucination.hallucination_rate,
            flagged: hallucination.flagged.clone(),
        };

        let checks = [
            (consistency.passed, consistency.mandatory),
            (traceability.passed, traceability.mandatory),
            (hallucination.passed, hallucination.mandatory),
        ];
        let overall_status = if checks.iter().any(|&(passed, mandatory)| !passed && mandatory) {
            OverallStatus::Fail
        } else if checks.iter().any(|&(passed, _)| !passed) || !warnings.is_empty() {
            OverallStatus::PassWithWarnings
        } else {
            OverallStatus::Pass
        };

        tracing::info!(
            "Validation {}: traceability {:.2}, {} consistency issue(s), {} hallucination(s)",
            overall_status,
            traceability.rate,
            consistency.issue_count,
            hallucination.hallucination_count
        );

        ValidationReport {
            overall_status,
            consistency,
            traceability,
            hallucination,
            warnings,
            blocking_failures: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_core::{BlockRef, ContentBlock};

    fn ledger(matched: usize, total: usize) -> TraceabilityLedger {
        TraceabilityLedger {
            citations: vec![],
            total_claims: total,
            matched_claims: matched,
            traceability_rate: crate::traceability::traceability_rate(matched, total),
            untraceable: vec![],
        }
    }

    fn clean() -> HallucinationVerdict {
        HallucinationVerdict {
            total_statements: 3,
            flagged: vec![],
            hallucination_rate: 0.0,
        }
    }

    fn one_flag() -> HallucinationVerdict {
        let block = ContentBlock::generated("summary", "Experts believe it.");
        HallucinationVerdict {
            total_statements: 2,
            flagged: vec![FlaggedStatement {
                block_ref: BlockRef::of(0, &block),
                sentence: 0,
                text: "Experts believe it.".into(),
                reasons: vec![HallucinationReason::HedgePhrase {
                    pattern: "experts believe".into(),
                }],
            }],
            hallucination_rate: 0.5,
        }
    }

    #[test]
    fn all_clear_passes() {
        let report = ReportAssembler::default().assemble(vec![], &ledger(4, 4), &clean(), vec![]);
        assert_eq!(report.overall_status, OverallStatus::Pass);
    }

    #[test]
    fn low_traceability_fails_by_default() {
        let report = ReportAssembler::default().assemble(vec![], &ledger(1, 2), &clean(), vec![]);
        assert_eq!(report.overall_status, OverallStatus::Fail);
        assert!(!report.traceability.passed);
    }

    #[test]
    fn non_mandatory_issue_warns() {
        let report = ReportAssembler::default().assemble(vec![], &ledger(9, 10), &one_flag(), vec![]);
        assert_eq!(report.overall_status, OverallStatus::PassWithWarnings);
        assert!(report.render_text().contains("[3] Hallucination: WARN"));
    }

    #[test]
    fn degradation_warning_alone_warns() {
        let report = ReportAssembler::default().assemble(
            vec![],
            &ledger(0, 0),
            &clean(),
            vec!["rule `risks` used fallback text".into()],
        );
        assert_eq!(report.overall_status, OverallStatus::PassWithWarnings);
    }

    #[test]
    fn mandatory_hallucination_fails() {
        let policy = ValidationPolicy::new().with_mandatory(MandatoryChecks {
            hallucination: true,
            ..MandatoryChecks::default()
        });
        let report = ReportAssembler::new(policy).assemble(vec![], &ledger(1, 1), &one_flag(), vec![]);
        assert_eq!(report.overall_status, OverallStatus::Fail);
    }

    #[test]
    fn threshold_validated() {
        assert!(ValidationPolicy::new().with_threshold(1.5).validate().is_err());
        assert!(ValidationPolicy::new().with_threshold(f64::NAN).validate().is_err());
        assert!(ValidationPolicy::new().validate().is_ok());
    }

    #[test]
    fn render_is_stable() {
        let report = ReportAssembler::default().assemble(vec![], &ledger(1, 2), &one_flag(), vec![]);
        let text = report.render_text();
        pretty_assertions::assert_eq!(text, report.render_text());
        assert!(text.contains("rate: 50.0% (threshold 80.0%)"));
        assert!(text.ends_with("Overall: FAIL\n"));
        assert_eq!(report.fingerprint(), report.clone().fingerprint());
    }

    #[test]
    fn blocking_failure_forces_fail() {
        let mut report = ReportAssembler::default().assemble(vec![], &ledger(0, 0), &clean(), vec![]);
        assert_eq!(report.overall_status, OverallStatus::Pass);

        report.record_blocking_failure("rule `summary`: 0 of 0 claims grounded");

        assert_eq!(report.overall_status, OverallStatus::Fail);
        assert!(report
            .render_text()
            .contains("Blocking failures:\n    - rule `summary`: 0 of 0 claims grounded"));
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&OverallStatus::PassWithWarnings).unwrap();
        assert_eq!(json, "\"PASS_WITH_WARNINGS\"");
    }
}
