//! Traceability builder
//!
//! Emits one [`Citation`] per matched claim, pointing at the exact source
//! address, and computes the traceability rate. Non-factual blocks never
//! produce claims, so filler prose counts toward neither side of the
//! ratio.

use crate::claims::Claim;
use crate::grounding::GroundingVerdict;
use crate::text::split_sentences;
use gr_core::{ContentBlock, InsertionId, SourceAddress};
use gr_facts::FactIndex;
use serde::{Deserialize, Serialize};

/// A matched claim and where its value came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Sentence containing the claim
    pub statement: String,
    /// Source location of the backing fact
    pub source_address: SourceAddress,
    /// Backing value as it appears in the source
    pub extracted_value: String,
    /// Match confidence
    pub confidence: f64,
    /// Rule that produced the statement
    pub insertion_id: InsertionId,
}

/// A claim that could not be traced to the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntraceableItem {
    /// Rule that produced the claim
    pub insertion_id: InsertionId,
    /// Claim text
    pub span: String,
}

/// Ordered citations plus the traceability rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilityLedger {
    /// Citations in block, then claim order
    pub citations: Vec<Citation>,
    /// Claims of factual blocks
    pub total_claims: usize,
    /// Claims with a citation
    pub matched_claims: usize,
    /// `matched / total`; `1.0` when there are no claims
    pub traceability_rate: f64,
    /// Unmatched claims
    pub untraceable: Vec<UntraceableItem>,
}

impl TraceabilityLedger {
    /// Addresses cited by this ledger that do not resolve in `index`
    #[must_use]
    pub fn unresolved_addresses(&self, index: &FactIndex) -> Vec<SourceAddress> {
        self.citations
            .iter()
            .filter(|c| !index.contains_address(&c.source_address))
            .map(|c| c.source_address.clone())
            .collect()
    }

    /// True when every citation resolves to an existing source record
    #[must_use]
    pub fn verify_against(&self, index: &FactIndex) -> bool {
        self.unresolved_addresses(index).is_empty()
    }
}

/// Builds the traceability ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceabilityBuilder;

impl TraceabilityBuilder {
    /// Create new builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the ledger for one validation pass
    ///
    /// `verdicts` must be parallel to `claims`.
    #[must_use]
    pub fn build(
        &self,
        blocks: &[ContentBlock],
        claims: &[Claim],
        verdicts: &[GroundingVerdict],
    ) -> TraceabilityLedger {
        let statements: Vec<Vec<&str>> = blocks
            .iter()
            .map(|b| split_sentences(&b.raw_text).into_iter().map(|s| s.text).collect())
            .collect();

        let mut citations = Vec::new();
        let mut untraceable = Vec::new();

        for (claim, verdict) in claims.iter().zip(verdicts) {
            match (&verdict.matched_fact, verdict.matched) {
                (Some(fact), true) => {
                    let statement = statements
                        .get(claim.block_ref.index)
                        .and_then(|s| s.get(claim.sentence))
                        .map_or_else(|| claim.raw_span.clone(), |s| (*s).to_string());
                    citations.push(Citation {
                        statement,
                        source_address: fact.source_address.clone(),
                        extracted_value: fact.display_value.clone(),
                        confidence: verdict.confidence,
                        insertion_id: claim.block_ref.insertion_id.clone(),
                    });
                }
                _ => untraceable.push(UntraceableItem {
                    insertion_id: claim.block_ref.insertion_id.clone(),
                    span: claim.raw_span.clone(),
                }),
            }
        }

        let total_claims = claims.len();
        let matched_claims = citations.len();
        TraceabilityLedger {
            citations,
            total_claims,
            matched_claims,
            traceability_rate: traceability_rate(matched_claims, total_claims),
            untraceable,
        }
    }
}

/// `matched / total`, defined as `1.0` when there is nothing to trace
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn traceability_rate(matched: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        matched.min(total) as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimExtractor;
    use crate::grounding::GroundingMatcher;
    use gr_core::SourceRecord;
    use proptest::prelude::*;

    #[test]
    fn citations_quote_the_statement() {
        let records = [SourceRecord::new(
            SourceAddress::new("impact.xlsx").with_sheet("2024").with_row(4).with_column("D"),
            "Acme",
            "served",
            "1,000",
        )];
        let index = FactIndex::build(&records);
        let blocks = [ContentBlock::generated("summary", "Acme served 1000 people. It also helped 5000 teachers.")
            .with_subject("Acme")];
        let claims = ClaimExtractor::default().extract_all(&blocks);
        let verdicts = GroundingMatcher::new(&index).match_all(&claims);
        let ledger = TraceabilityBuilder::new().build(&blocks, &claims, &verdicts);

        assert_eq!(ledger.citations.len(), 1);
        let citation = &ledger.citations[0];
        assert_eq!(citation.statement, "Acme served 1000 people.");
        assert_eq!(citation.extracted_value, "1,000");
        assert_eq!(citation.source_address.to_string(), "impact.xlsx!2024:4:D");
        assert_eq!(ledger.untraceable[0].span, "5000");
        assert!((ledger.traceability_rate - 0.5).abs() < 1e-9);
        assert!(ledger.verify_against(&index));
    }

    #[test]
    fn no_claims_means_full_traceability() {
        let ledger = TraceabilityBuilder::new().build(&[], &[], &[]);
        assert_eq!(ledger.traceability_rate, 1.0);
        assert_eq!(ledger.total_claims, 0);
    }

    #[test]
    fn foreign_address_fails_verification() {
        let ledger = TraceabilityLedger {
            citations: vec![Citation {
                statement: "x".into(),
                source_address: SourceAddress::new("other.csv"),
                extracted_value: "1".into(),
                confidence: 1.0,
                insertion_id: "s".into(),
            }],
            total_claims: 1,
            matched_claims: 1,
            traceability_rate: 1.0,
            untraceable: vec![],
        };
        assert!(!ledger.verify_against(&FactIndex::default()));
    }

    proptest! {
        #[test]
        fn prop_rate_is_bounded(matched in 0usize..500, total in 0usize..500) {
            let rate = traceability_rate(matched, total);
            prop_assert!((0.0..=1.0).contains(&rate));
            if total == 0 {
                prop_assert_eq!(rate, 1.0);
            }
        }
    }
}
