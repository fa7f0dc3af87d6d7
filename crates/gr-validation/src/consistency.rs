//! Consistency checker
//!
//! Detects one fact rendered differently in different places. Two
//! groupings are checked:
//! - Entity claims grouped by the fact they resolved to. Any two distinct
//!   normalized renderings are an issue; abbreviations are not reconciled.
//! - Numeric claims with a unit grouped by `(subject entity, unit)`. Two or
//!   more distinct values where at least one is not backed by a source fact
//!   with that unit are an issue.
//!
//! Issues are recorded in the report and never abort a run.

use crate::claims::{Claim, ClaimType};
use crate::grounding::GroundingVerdict;
use gr_core::BlockRef;
use gr_facts::{normalize_text, FactIndex, FactKey, FactKind};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// What a group of diverging claims refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKey {
    /// A single source fact (entity names)
    Fact(FactKey),
    /// A quantity of one entity in one unit
    Quantity {
        /// Case-folded subject entity, empty when unknown
        entity: String,
        /// Normalized unit
        unit: String,
    },
}

impl Display for IssueKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fact(key) => write!(f, "{key}"),
            Self::Quantity { entity, unit } => write!(f, "quantity:{entity}[{unit}]"),
        }
    }
}

/// One rendering of a fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Block containing the rendering
    pub block_ref: BlockRef,
    /// Normalized rendering
    pub normalized_value: String,
    /// Text as written
    pub raw_span: String,
}

/// The same fact rendered with disagreeing values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    /// What the renderings refer to
    pub fact_key: IssueKey,
    /// Every rendering in block order
    pub occurrences: Vec<Occurrence>,
}

impl ConsistencyIssue {
    /// Distinct normalized values among the occurrences
    #[must_use]
    pub fn distinct_values(&self) -> Vec<&str> {
        let set: IndexSet<&str> = self
            .occurrences
            .iter()
            .map(|o| o.normalized_value.as_str())
            .collect();
        set.into_iter().collect()
    }
}

/// Cross-block consistency checker
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyChecker;

impl ConsistencyChecker {
    /// Create new checker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compare all claims of a validation pass
    ///
    /// `verdicts` must be parallel to `claims`.
    #[must_use]
    pub fn check(
        &self,
        claims: &[Claim],
        verdicts: &[GroundingVerdict],
        index: &FactIndex,
    ) -> Vec<ConsistencyIssue> {
        let mut groups: IndexMap<IssueKey, Vec<&Claim>> = IndexMap::new();

        for (claim, verdict) in claims.iter().zip(verdicts) {
            let key = match claim.claim_type {
                ClaimType::Entity => match &verdict.matched_fact {
                    Some(fact) => IssueKey::Fact(fact.key()),
                    None => continue,
                },
                ClaimType::Numeric => match &claim.unit {
                    Some(unit) => IssueKey::Quantity {
                        entity: claim
                            .subject_entity
                            .as_deref()
                            .map(normalize_text)
                            .unwrap_or_default(),
                        unit: unit.clone(),
                    },
                    None => continue,
                },
                ClaimType::Date => continue,
            };
            groups.entry(key).or_default().push(claim);
        }

        let issues: Vec<ConsistencyIssue> = groups
            .into_iter()
            .filter(|(key, members)| Self::diverges(key, members, index))
            .map(|(fact_key, members)| ConsistencyIssue {
                fact_key,
                occurrences: members
                    .into_iter()
                    .map(|c| Occurrence {
                        block_ref: c.block_ref.clone(),
                        normalized_value: c.normalized_value.clone(),
                        raw_span: c.raw_span.clone(),
                    })
                    .collect(),
            })
            .collect();

        for issue in &issues {
            tracing::warn!(
                "Inconsistent renderings of {}: {:?}",
                issue.fact_key,
                issue.distinct_values()
            );
        }
        issues
    }

    fn diverges(key: &IssueKey, members: &[&Claim], index: &FactIndex) -> bool {
        let values: IndexSet<&str> = members.iter().map(|c| c.normalized_value.as_str()).collect();
        if values.len() < 2 {
            return false;
        }
        match key {
            IssueKey::Fact(_) => true,
            IssueKey::Quantity { entity, unit } => values.iter().any(|value| {
                let backed = |f: &gr_facts::Fact| f.unit.as_deref() == Some(unit.as_str());
                if entity.is_empty() {
                    !index.lookup_value(FactKind::Numeric, value).any(|f| backed(f))
                } else {
                    !index
                        .lookup_in_entity(entity, FactKind::Numeric, value)
                        .any(|f| backed(f))
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimExtractor;
    use crate::grounding::GroundingMatcher;
    use gr_core::{ContentBlock, FieldValue, SourceAddress, SourceRecord};

    fn rec(entity: &str, field: &str, row: u32, value: impl Into<FieldValue>) -> SourceRecord {
        SourceRecord::new(SourceAddress::new("impact.xlsx").with_row(row), entity, field, value)
    }

    fn run(records: &[SourceRecord], texts: &[&str]) -> Vec<ConsistencyIssue> {
        let index = FactIndex::build(records);
        let blocks: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| ContentBlock::generated(format!("block{i}"), *t).with_subject("Acme"))
            .collect();
        let claims = ClaimExtractor::default().extract_all(&blocks);
        let verdicts = GroundingMatcher::new(&index).match_all(&claims);
        ConsistencyChecker::new().check(&claims, &verdicts, &index)
    }

    #[test]
    fn abbreviated_entity_name_is_flagged() {
        let records = [rec("Acme", "name", 1, "Acme Corp")];
        let issues = run(&records, &["We thank Acme Corp warmly.", "Staff at ACME agreed."]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].distinct_values(), vec!["acme corp", "acme"]);
        assert_eq!(issues[0].occurrences[1].block_ref.index, 1);
    }

    #[test]
    fn identical_renderings_are_consistent() {
        let records = [rec("Acme", "name", 1, "Acme Corp")];
        assert!(run(&records, &["We thank Acme Corp.", "Again, Acme Corp delivered."]).is_empty());
    }

    #[test]
    fn diverging_quantity_flagged_when_unbacked() {
        let records = [rec("Acme", "served", 1, 1000.0).with_unit("people")];
        let issues = run(&records, &["It served 1000 people.", "It served 1200 people."]);
        assert_eq!(issues.len(), 1);
        assert!(matches!(&issues[0].fact_key, IssueKey::Quantity { unit, .. } if unit == "people"));
    }

    #[test]
    fn distinct_backed_quantities_are_fine() {
        let records = [
            rec("Acme", "served_2022", 1, 800.0).with_unit("people"),
            rec("Acme", "served_2023", 2, 1000.0).with_unit("people"),
        ];
        assert!(run(&records, &["It served 800 people.", "Then 1000 people."]).is_empty());
    }

    #[test]
    fn unitless_numbers_not_grouped() {
        let records = [rec("Acme", "x", 1, 5.0)];
        assert!(run(&records, &["Score was 5.", "Score was 6."]).is_empty());
    }
}
