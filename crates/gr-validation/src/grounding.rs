//! Grounding matcher
//!
//! Resolves each [`Claim`] to at most one [`Fact`]:
//! - Numeric claims match on exact equality of the normalized value. No
//!   tolerance. When several facts share the value, the block's subject
//!   entity wins, then a fact whose unit agrees, then source order.
//! - Entity claims match known names by case-folded equality, or by
//!   word-aligned containment in either direction.
//! - Date claims match date facts on the ISO form, subject entity first.

use crate::claims::{Claim, ClaimType};
use gr_facts::{contains_words, normalize_text, Fact, FactIndex, FactKind, KnownName};
use serde::{Deserialize, Serialize};

/// Confidence of a numeric match scoped to the subject entity
pub const SUBJECT_SCOPE_CONFIDENCE: f64 = 1.0;
/// Confidence of a numeric match owned by another entity
pub const CROSS_ENTITY_CONFIDENCE: f64 = 0.8;
/// Multiplier applied when claim and fact units disagree
pub const UNIT_MISMATCH_FACTOR: f64 = 0.9;
/// Confidence of an exact name match
pub const NAME_EXACT_CONFIDENCE: f64 = 1.0;
/// Confidence of a containment name match
pub const NAME_CONTAINED_CONFIDENCE: f64 = 0.7;
/// Shorter side of a containment match must have this many chars
pub const MIN_CONTAINMENT_CHARS: usize = 3;

/// Outcome of grounding one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingVerdict {
    /// Whether a backing fact was found
    pub matched: bool,
    /// The backing fact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_fact: Option<Fact>,
    /// Match confidence in `[0, 1]`; `0` when unmatched
    pub confidence: f64,
}

impl GroundingVerdict {
    /// Verdict for a claim with no backing fact
    #[inline]
    #[must_use]
    pub fn unmatched() -> Self {
        Self {
            matched: false,
            matched_fact: None,
            confidence: 0.0,
        }
    }

    fn matched(fact: &Fact, confidence: f64) -> Self {
        Self {
            matched: true,
            matched_fact: Some(fact.clone()),
            confidence,
        }
    }
}

/// Matches claims against a fact index
#[derive(Debug, Clone, Copy)]
pub struct GroundingMatcher<'a> {
    index: &'a FactIndex,
}

impl<'a> GroundingMatcher<'a> {
    /// Matcher over `index`
    #[inline]
    #[must_use]
    pub fn new(index: &'a FactIndex) -> Self {
        Self { index }
    }

    /// One verdict per claim, same order
    #[must_use]
    pub fn match_all(&self, claims: &[Claim]) -> Vec<GroundingVerdict> {
        claims.iter().map(|c| self.match_claim(c)).collect()
    }

    /// Ground a single claim
    #[must_use]
    pub fn match_claim(&self, claim: &Claim) -> GroundingVerdict {
        let verdict = match claim.claim_type {
            ClaimType::Numeric => self.match_numeric(claim),
            ClaimType::Entity => self.match_entity(claim),
            ClaimType::Date => self.match_date(claim),
        };
        if !verdict.matched {
            tracing::debug!(
                "Ungrounded {} claim '{}' in {}",
                claim.claim_type,
                claim.raw_span,
                claim.block_ref
            );
        }
        verdict
    }

    fn match_numeric(&self, claim: &Claim) -> GroundingVerdict {
        let candidates: Vec<&Fact> = self
            .index
            .lookup_value(FactKind::Numeric, &claim.normalized_value)
            .collect();
        if candidates.is_empty() {
            return GroundingVerdict::unmatched();
        }

        let unit_agrees = |f: &&Fact| match (&claim.unit, &f.unit) {
            (Some(cu), Some(fu)) => cu == fu,
            _ => true,
        };
        let pick = |pool: &[&'a Fact]| -> Option<&'a Fact> {
            pool.iter().copied().find(|f| unit_agrees(f)).or_else(|| pool.first().copied())
        };

        let (fact, base) = match claim.subject_entity.as_deref().map(normalize_text) {
            Some(subject) => {
                let scoped: Vec<&Fact> = candidates
                    .iter()
                    .copied()
                    .filter(|f| normalize_text(&f.owning_entity) == subject)
                    .collect();
                match pick(&scoped) {
                    Some(f) => (f, SUBJECT_SCOPE_CONFIDENCE),
                    None => match pick(&candidates) {
                        Some(f) => (f, CROSS_ENTITY_CONFIDENCE),
                        None => return GroundingVerdict::unmatched(),
                    },
                }
            }
            None => match pick(&candidates) {
                Some(f) => (f, SUBJECT_SCOPE_CONFIDENCE),
                None => return GroundingVerdict::unmatched(),
            },
        };

        let confidence = if unit_agrees(&fact) {
            base
        } else {
            base * UNIT_MISMATCH_FACTOR
        };
        GroundingVerdict::matched(fact, confidence)
    }

    fn match_date(&self, claim: &Claim) -> GroundingVerdict {
        let mut candidates = self.index.lookup_value(FactKind::Text, &claim.normalized_value).peekable();
        let Some(first) = candidates.peek().copied() else {
            return GroundingVerdict::unmatched();
        };
        let subject = claim.subject_entity.as_deref().map(normalize_text);
        match candidates.find(|f| Some(normalize_text(&f.owning_entity)) == subject) {
            Some(fact) => GroundingVerdict::matched(fact, SUBJECT_SCOPE_CONFIDENCE),
            None if subject.is_none() => GroundingVerdict::matched(first, SUBJECT_SCOPE_CONFIDENCE),
            None => GroundingVerdict::matched(first, CROSS_ENTITY_CONFIDENCE),
        }
    }

    fn match_entity(&self, claim: &Claim) -> GroundingVerdict {
        let needle = claim.normalized_value.as_str();
        let subject = claim.subject_entity.as_deref().map(normalize_text);
        let needle_len = needle.chars().count();

        let best = self
            .index
            .known_names()
            .iter()
            .enumerate()
            .filter_map(|(order, name)| {
                let exact = name.folded == needle;
                if !exact && !contains_either_way(&name.folded, needle) {
                    return None;
                }
                let off_subject = subject.as_deref() != Some(name.entity.as_str());
                let len_diff = name.folded.chars().count().abs_diff(needle_len);
                Some(((!exact, off_subject, len_diff, order), name))
            })
            .min_by(|a, b| a.0.cmp(&b.0));

        let Some(((contained, ..), name)) = best else {
            return GroundingVerdict::unmatched();
        };
        self.resolve_name(name, contained)
    }

    fn resolve_name(&self, name: &KnownName, contained: bool) -> GroundingVerdict {
        let Some(fact) = self.index.get(name.fact) else {
            return GroundingVerdict::unmatched();
        };
        let confidence = if contained {
            NAME_CONTAINED_CONFIDENCE
        } else {
            NAME_EXACT_CONFIDENCE
        };
        GroundingVerdict::matched(fact, confidence)
    }
}

/// Convenience wrapper for one-off grounding
#[must_use]
pub fn ground(claim: &Claim, index: &FactIndex) -> GroundingVerdict {
    GroundingMatcher::new(index).match_claim(claim)
}

/// Word-aligned containment of the shorter string in the longer one
fn contains_either_way(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.chars().count() >= MIN_CONTAINMENT_CHARS && contains_words(long, short)
}
