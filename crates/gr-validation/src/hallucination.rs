//! Hallucination detector
//!
//! A statement (sentence of a factual block) is hallucinated when it
//! carries an ungrounded claim or matches a hedge phrase such as an
//! unverifiable appeal to research. Non-factual blocks are exempt.
//! The detector only reports; blocking is a per-rule decision made by the
//! orchestrator.

use crate::claims::Claim;
use crate::error::ValidationError;
use crate::grounding::GroundingVerdict;
use crate::text::split_sentences;
use gr_core::{BlockRef, ContentBlock};
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

/// Default hedge and unsupported-assertion patterns
pub const DEFAULT_HEDGE_PATTERNS: &[&str] = &[
    r"according to (?:our|recent) analysis",
    r"it is (?:well|widely|generally) known",
    r"studies (?:show|have shown|suggest|indicate)",
    r"research (?:shows|has shown|suggests|indicates)",
    r"experts (?:believe|agree|say)",
    r"statistics (?:show|indicate)",
    r"industry (?:data|reports) (?:show|suggest)",
    r"根据我们的分析",
    r"众所周知",
    r"研究表明",
    r"专家认为",
];

/// Hedge pattern configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallucinationConfig {
    /// Regular expressions flagged as unsupported assertions
    pub hedge_patterns: Vec<String>,
    /// Match patterns case-insensitively
    pub case_insensitive: bool,
}

impl Default for HallucinationConfig {
    fn default() -> Self {
        Self {
            hedge_patterns: DEFAULT_HEDGE_PATTERNS.iter().map(|p| (*p).to_string()).collect(),
            case_insensitive: true,
        }
    }
}

impl HallucinationConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hedge pattern
    #[inline]
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.hedge_patterns.push(pattern.into());
        self
    }
}

/// Why a statement was flagged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HallucinationReason {
    /// A claim with no backing fact
    UngroundedClaim {
        /// Claim text
        span: String,
    },
    /// Matched a hedge pattern
    HedgePhrase {
        /// Pattern that matched
        pattern: String,
    },
}

/// A statement flagged as hallucinated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedStatement {
    /// Block containing the statement
    pub block_ref: BlockRef,
    /// Sentence index inside the block
    pub sentence: usize,
    /// Statement text
    pub text: String,
    /// All reasons, in claim order then pattern order
    pub reasons: Vec<HallucinationReason>,
}

/// Detector output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationVerdict {
    /// Statements in factual blocks
    pub total_statements: usize,
    /// Flagged statements in block order
    pub flagged: Vec<FlaggedStatement>,
    /// `flagged / total`, `0` when there are no statements
    pub hallucination_rate: f64,
}

impl HallucinationVerdict {
    /// Number of hallucinated statements
    #[inline]
    #[must_use]
    pub fn hallucination_count(&self) -> usize {
        self.flagged.len()
    }

    /// Flagged statements of one rule
    pub fn flagged_for<'a>(&'a self, insertion_id: &'a str) -> impl Iterator<Item = &'a FlaggedStatement> + 'a {
        self.flagged
            .iter()
            .filter(move |s| s.block_ref.insertion_id.as_str() == insertion_id)
    }
}

/// Statement-level hallucination detector
#[derive(Debug, Clone)]
pub struct HallucinationDetector {
    patterns: Vec<String>,
    set: RegexSet,
}

impl HallucinationDetector {
    /// Compile the configured patterns
    ///
    /// # Errors
    /// Returns error if a pattern is not a valid regular expression
    pub fn new(config: &HallucinationConfig) -> Result<Self, ValidationError> {
        let set = RegexSetBuilder::new(&config.hedge_patterns)
            .case_insensitive(config.case_insensitive)
            .build()
            .map_err(|e| ValidationError::InvalidPattern(e.to_string()))?;
        Ok(Self {
            patterns: config.hedge_patterns.clone(),
            set,
        })
    }

    /// Detector with the default pattern list
    ///
    /// # Errors
    /// Returns error if a default pattern fails to compile
    pub fn with_defaults() -> Result<Self, ValidationError> {
        Self::new(&HallucinationConfig::default())
    }

    /// Flag statements of all factual blocks
    ///
    /// `verdicts` must be parallel to `claims`.
    #[must_use]
    pub fn detect(
        &self,
        blocks: &[ContentBlock],
        claims: &[Claim],
        verdicts: &[GroundingVerdict],
    ) -> HallucinationVerdict {
        let mut total_statements = 0;
        let mut flagged = Vec::new();

        for (index, block) in blocks.iter().enumerate() {
            if !block.is_factual {
                continue;
            }
            let block_ref = BlockRef::of(index, block);

            for sentence in split_sentences(&block.raw_text) {
                total_statements += 1;

                let mut reasons: Vec<HallucinationReason> = claims
                    .iter()
                    .zip(verdicts)
                    .filter(|(c, v)| {
                        !v.matched && c.block_ref.index == index && c.sentence == sentence.index
                    })
                    .map(|(c, _)| HallucinationReason::UngroundedClaim {
                        span: c.raw_span.clone(),
                    })
                    .collect();
                reasons.extend(self.set.matches(sentence.text).into_iter().map(|i| {
                    HallucinationReason::HedgePhrase {
                        pattern: self.patterns[i].clone(),
                    }
                }));

                if !reasons.is_empty() {
                    flagged.push(FlaggedStatement {
                        block_ref: block_ref.clone(),
                        sentence: sentence.index,
                        text: sentence.text.to_string(),
                        reasons,
                    });
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let hallucination_rate = if total_statements == 0 {
            0.0
        } else {
            flagged.len() as f64 / total_statements as f64
        };

        if !flagged.is_empty() {
            tracing::warn!(
                "Flagged {}/{} statements as hallucinated",
                flagged.len(),
                total_statements
            );
        }

        HallucinationVerdict {
            total_statements,
            flagged,
            hallucination_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimExtractor;
    use crate::grounding::GroundingMatcher;
    use gr_core::{SourceAddress, SourceRecord};
    use gr_facts::FactIndex;

    fn detect(blocks: &[ContentBlock]) -> HallucinationVerdict {
        let records = [SourceRecord::new(SourceAddress::new("a.csv").with_row(1), "Acme", "served", 1000.0)
            .with_unit("people")];
        let index = FactIndex::build(&records);
        let claims = ClaimExtractor::default().extract_all(blocks);
        let verdicts = GroundingMatcher::new(&index).match_all(&claims);
        HallucinationDetector::with_defaults()
            .unwrap()
            .detect(blocks, &claims, &verdicts)
    }

    #[test]
    fn ungrounded_claim_flags_its_statement() {
        let blocks = [ContentBlock::generated("s", "It served 1000 people. It helped 5000 teachers.")
            .with_subject("Acme")];
        let verdict = detect(&blocks);
        assert_eq!(verdict.total_statements, 2);
        assert_eq!(verdict.hallucination_count(), 1);
        assert_eq!(verdict.flagged[0].sentence, 1);
        assert_eq!(
            verdict.flagged[0].reasons,
            vec![HallucinationReason::UngroundedClaim { span: "5000".into() }]
        );
        assert!((verdict.hallucination_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn hedge_phrases_flagged_case_insensitively() {
        let blocks = [
            ContentBlock::generated("s", "Studies show that outreach works."),
            ContentBlock::generated("t", "众所周知，教育很重要。"),
        ];
        let verdict = detect(&blocks);
        assert_eq!(verdict.hallucination_count(), 2);
        assert!(matches!(
            &verdict.flagged[0].reasons[0],
            HallucinationReason::HedgePhrase { pattern } if pattern.starts_with("studies")
        ));
    }

    #[test]
    fn non_factual_blocks_exempt() {
        let blocks = [ContentBlock::fallback("s", "Experts believe 42 things.")];
        let verdict = detect(&blocks);
        assert_eq!(verdict.total_statements, 0);
        assert_eq!(verdict.hallucination_rate, 0.0);
    }

    #[test]
    fn invalid_pattern_rejected() {
        let config = HallucinationConfig::new().with_pattern("(unclosed");
        assert!(matches!(
            HallucinationDetector::new(&config),
            Err(ValidationError::InvalidPattern(_))
        ));
    }

    #[test]
    fn flagged_for_filters_by_rule() {
        let blocks = [
            ContentBlock::generated("a", "Experts believe it."),
            ContentBlock::generated("b", "Plain text here."),
        ];
        let verdict = detect(&blocks);
        assert_eq!(verdict.flagged_for("a").count(), 1);
        assert_eq!(verdict.flagged_for("b").count(), 0);
    }
}
