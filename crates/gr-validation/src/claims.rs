//! Claim extraction
//!
//! Bounded, deterministic scan of block text for:
//! - Numeric tokens with an optional sign, optionally followed by `%` or a
//!   unit word
//! - ISO calendar dates (`2020-05-01`), taken whole before the numeric pass
//! - Quoted spans and runs of capitalised words (entity claims)
//!
//! This is not a semantic parser. Claims phrased without numerals or
//! capitalised names are missed; that is a known precision limit.

use crate::text::{split_sentences, Sentence};
use gr_core::{BlockRef, ContentBlock};
use chrono::NaiveDate;
use gr_facts::{normalize_date, normalize_number, normalize_text, normalize_unit, MAX_NAME_WORDS};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+\x{2212}]?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?").expect("valid number regex")
});

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid date regex"));

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s?%").expect("valid percent regex"));

static UNIT_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+([a-z][a-z\-]*)").expect("valid unit regex")
});

static QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"\n]{2,80})"|“([^”\n]{2,80})”"#).expect("valid quote regex")
});

static CAPITALISED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][A-Za-z0-9&\-]*(?:(?:\s+(?:of(?:\s+the)?|for|de|du|la))?\s+[A-Z][A-Za-z0-9&\-]*)*")
        .expect("valid capitalised regex")
});

/// Kind of atomic assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// Number with optional unit
    Numeric,
    /// Named entity
    Entity,
    /// ISO calendar date
    Date,
}

impl Display for ClaimType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => f.write_str("numeric"),
            Self::Entity => f.write_str("entity"),
            Self::Date => f.write_str("date"),
        }
    }
}

/// An atomic assertion parsed from a content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Numeric, entity or date
    pub claim_type: ClaimType,
    /// Text exactly as written
    pub raw_span: String,
    /// Comparison form (canonical number or folded text)
    pub normalized_value: String,
    /// Normalized unit for numeric claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Block the claim came from
    pub block_ref: BlockRef,
    /// Subject entity of that block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_entity: Option<String>,
    /// Sentence index inside the block
    pub sentence: usize,
    /// Byte range inside the block text
    pub span: (usize, usize),
}

/// Extraction heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Capitalised words that are never entity claims (months, weekdays)
    pub ignored_terms: Vec<String>,
    /// Lower-case words after a number that are not units
    pub unit_stopwords: Vec<String>,
    /// Capitalised words stripped from the front of an entity run
    pub leading_stopwords: Vec<String>,
    /// Numbers below this are not claims (e.g. small ordinals)
    pub min_numeric_value: Option<f64>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect();
        Self {
            ignored_terms: words(&[
                "january", "february", "march", "april", "may", "june", "july", "august",
                "september", "october", "november", "december", "monday", "tuesday",
                "wednesday", "thursday", "friday", "saturday", "sunday",
            ]),
            unit_stopwords: words(&[
                "a", "an", "and", "are", "as", "at", "by", "for", "from", "had", "has", "have",
                "in", "into", "is", "of", "on", "or", "than", "that", "the", "this", "to", "was",
                "were", "which", "while", "with",
            ]),
            leading_stopwords: words(&[
                "a", "additionally", "an", "as", "at", "by", "during", "for", "from",
                "furthermore", "however", "in", "its", "it", "meanwhile", "moreover", "of",
                "on", "our", "overall", "since", "the", "their", "these", "they", "this",
                "those", "through", "we", "with",
            ]),
            min_numeric_value: None,
        }
    }
}

impl ExtractorConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore numbers below `min`
    #[inline]
    #[must_use]
    pub fn with_min_numeric_value(mut self, min: f64) -> Self {
        self.min_numeric_value = Some(min);
        self
    }

    /// Add a term that is never an entity claim
    #[inline]
    #[must_use]
    pub fn with_ignored_term(mut self, term: impl Into<String>) -> Self {
        self.ignored_terms.push(term.into());
        self
    }
}

/// Pattern-based claim extractor
#[derive(Debug, Clone)]
pub struct ClaimExtractor {
    ignored: HashSet<String>,
    unit_stopwords: HashSet<String>,
    leading_stopwords: HashSet<String>,
    min_numeric_value: Option<f64>,
}

impl Default for ClaimExtractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

impl ClaimExtractor {
    /// Build from config; word lists are case-folded once
    #[must_use]
    pub fn new(config: &ExtractorConfig) -> Self {
        let fold = |list: &[String]| list.iter().map(|w| normalize_text(w)).collect();
        Self {
            ignored: fold(&config.ignored_terms),
            unit_stopwords: fold(&config.unit_stopwords),
            leading_stopwords: fold(&config.leading_stopwords),
            min_numeric_value: config.min_numeric_value,
        }
    }

    /// Claims of every factual block, in block order
    #[must_use]
    pub fn extract_all(&self, blocks: &[ContentBlock]) -> Vec<Claim> {
        blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_factual)
            .flat_map(|(i, b)| self.extract(b, BlockRef::of(i, b)))
            .collect()
    }

    /// Claims of one block, ordered by position
    #[must_use]
    pub fn extract(&self, block: &ContentBlock, block_ref: BlockRef) -> Vec<Claim> {
        let text = block.raw_text.as_str();
        let mut claims = Vec::new();

        for sentence in split_sentences(text) {
            let mut found = self.date_claims(text, &sentence);
            let dates: Vec<(usize, usize)> = found.iter().map(|c| c.span).collect();
            found.extend(self.numeric_claims(text, &sentence, &dates));
            found.extend(self.entity_claims(&sentence));
            found.sort_by_key(|c| c.span);

            claims.extend(found.into_iter().map(|c| Claim {
                claim_type: c.claim_type,
                raw_span: text[c.span.0..c.span.1].to_string(),
                normalized_value: c.normalized_value,
                unit: c.unit,
                block_ref: block_ref.clone(),
                subject_entity: block.subject_entity.clone(),
                sentence: sentence.index,
                span: c.span,
            }));
        }

        tracing::trace!("Extracted {} claims from {}", claims.len(), block_ref);
        claims
    }

    fn date_claims(&self, text: &str, sentence: &Sentence<'_>) -> Vec<RawClaim> {
        let mut out = Vec::new();
        for m in ISO_DATE.find_iter(sentence.text) {
            let start = sentence.start + m.start();
            let end = sentence.start + m.end();
            if glued_before(text, start) || text[end..].chars().next().is_some_and(char::is_alphanumeric) {
                continue;
            }
            let Ok(date) = NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d") else {
                continue;
            };
            out.push(RawClaim {
                claim_type: ClaimType::Date,
                normalized_value: normalize_date(date),
                unit: None,
                span: (start, end),
            });
        }
        out
    }

    fn numeric_claims(
        &self,
        text: &str,
        sentence: &Sentence<'_>,
        taken: &[(usize, usize)],
    ) -> Vec<RawClaim> {
        let mut out = Vec::new();

        for m in NUMBER.find_iter(sentence.text) {
            let mut start = sentence.start + m.start();
            let end = sentence.start + m.end();
            if taken.iter().any(|&(s, e)| start < e && s < end) {
                continue;
            }

            // A sign glued to a preceding token is a hyphen, as in `10-20`.
            let mut token = m.as_str();
            if let Some(sign) = token.chars().next().filter(|c| matches!(c, '-' | '+' | '\u{2212}')) {
                if glued_before(text, start) {
                    start += sign.len_utf8();
                    token = &token[sign.len_utf8()..];
                }
            }

            if glued_before(text, start) {
                continue;
            }
            let after = text[end..].chars().next();
            if after.is_some_and(char::is_alphabetic) {
                continue;
            }

            let Some(value) = normalize_number(token) else {
                continue;
            };
            if let Some(min) = self.min_numeric_value {
                if value.parse::<f64>().is_ok_and(|v| v < min) {
                    continue;
                }
            }

            let rest = &sentence.text[m.end()..];
            let (unit, span_end) = if let Some(pct) = PERCENT.find(rest) {
                (Some("%".to_string()), end + pct.end())
            } else if let Some(word) = UNIT_WORD.captures(rest).and_then(|c| c.get(1)) {
                let folded = word.as_str().to_lowercase();
                if self.unit_stopwords.contains(&folded) {
                    (None, end)
                } else {
                    (Some(normalize_unit(&folded)), end)
                }
            } else {
                (None, end)
            };

            out.push(RawClaim {
                claim_type: ClaimType::Numeric,
                normalized_value: value,
                unit,
                span: (start, span_end),
            });
        }
        out
    }

    fn entity_claims(&self, sentence: &Sentence<'_>) -> Vec<RawClaim> {
        let mut out = Vec::new();
        let mut quoted_ranges = Vec::new();

        for caps in QUOTED.captures_iter(sentence.text) {
            let Some(inner) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            if let Some(whole) = caps.get(0) {
                quoted_ranges.push((whole.start(), whole.end()));
            }
            let folded = normalize_text(inner.as_str());
            if folded.chars().count() < 2
                || folded.split(' ').count() > MAX_NAME_WORDS
                || normalize_number(&folded).is_some()
            {
                continue;
            }
            out.push(RawClaim {
                claim_type: ClaimType::Entity,
                normalized_value: folded,
                unit: None,
                span: (sentence.start + inner.start(), sentence.start + inner.end()),
            });
        }

        for m in CAPITALISED.find_iter(sentence.text) {
            if quoted_ranges.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            let (offset, run) = self.strip_leading(m.start(), m.as_str());
            if run.is_empty() || !run.starts_with(|c: char| c.is_uppercase()) {
                continue;
            }

            let folded = normalize_text(run);
            if self.ignored.contains(&folded) {
                continue;
            }

            if !run.contains(char::is_whitespace) {
                let letters: Vec<char> = run.chars().filter(|c| c.is_alphabetic()).collect();
                let acronym = letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase());
                if letters.len() < 2 || (offset == 0 && !acronym) {
                    continue;
                }
            }

            let start = sentence.start + offset;
            out.push(RawClaim {
                claim_type: ClaimType::Entity,
                normalized_value: folded,
                unit: None,
                span: (start, start + run.len()),
            });
        }
        out
    }

    /// Drop stopwords from the front of a capitalised run
    fn strip_leading<'a>(&self, mut offset: usize, mut run: &'a str) -> (usize, &'a str) {
        loop {
            let word_end = run.find(char::is_whitespace).unwrap_or(run.len());
            let word = &run[..word_end];
            if word.is_empty() || !self.leading_stopwords.contains(&word.to_lowercase()) {
                return (offset, run);
            }
            let rest = &run[word_end..];
            let trimmed = rest.trim_start();
            offset += word_end + (rest.len() - trimmed.len());
            run = trimmed;
        }
    }
}

fn glued_before(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

struct RawClaim {
    claim_type: ClaimType,
    normalized_value: String,
    unit: Option<String>,
    span: (usize, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<Claim> {
        let block = ContentBlock::generated("summary", text).with_subject("Acme");
        ClaimExtractor::default().extract(&block, BlockRef::of(0, &block))
    }

    fn spans(claims: &[Claim]) -> Vec<(&str, ClaimType)> {
        claims.iter().map(|c| (c.raw_span.as_str(), c.claim_type)).collect()
    }

    #[test]
    fn numeric_with_unit_word() {
        let claims = extract("Acme served 1000 people.");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claim_type, ClaimType::Numeric);
        assert_eq!(claims[0].normalized_value, "1000");
        assert_eq!(claims[0].unit.as_deref(), Some("people"));
        assert_eq!(claims[0].raw_span, "1000");
        assert_eq!(claims[0].subject_entity.as_deref(), Some("Acme"));
    }

    #[test]
    fn grouped_numbers_and_percent() {
        let claims = extract("Funding reached 1,250,000 and retention hit 35% overall.");
        let values: Vec<_> = claims
            .iter()
            .map(|c| (c.normalized_value.as_str(), c.unit.as_deref()))
            .collect();
        assert_eq!(values, vec![("1250000", None), ("35", Some("%"))]);
        assert_eq!(claims[1].raw_span, "35%");
    }

    #[test]
    fn glued_numbers_are_not_claims() {
        assert!(extract("It reduced CO2 output, see SDG3 and the 3rd pillar.")
            .iter()
            .all(|c| c.claim_type != ClaimType::Numeric));
    }

    #[test]
    fn decimal_number_inside_sentence() {
        let claims = extract("Average income rose by 12.5 percent.");
        assert_eq!(claims[0].normalized_value, "12.5");
        assert_eq!(claims[0].unit.as_deref(), Some("%"));
    }

    #[test]
    fn sentence_initial_title_word_is_not_an_entity() {
        assert!(extract("Acme served 1000 people.")
            .iter()
            .all(|c| c.claim_type == ClaimType::Numeric));
    }

    #[test]
    fn multi_word_and_acronym_entities() {
        let claims = extract("Acme Corp partnered with UNICEF in Kenya.");
        assert_eq!(
            spans(&claims),
            vec![
                ("Acme Corp", ClaimType::Entity),
                ("UNICEF", ClaimType::Entity),
                ("Kenya", ClaimType::Entity),
            ]
        );
        assert_eq!(claims[0].normalized_value, "acme corp");
    }

    #[test]
    fn leading_stopwords_stripped() {
        let claims = extract("In Nairobi the Bank of Kenya joined.");
        assert_eq!(
            spans(&claims),
            vec![("Nairobi", ClaimType::Entity), ("Bank of Kenya", ClaimType::Entity)]
        );
        assert_eq!(claims[0].span.0, 3);
    }

    #[test]
    fn signed_numbers_keep_their_sign() {
        let claims = extract("Net change was -5 percent, then \u{2212}2.5 and +3 later.");
        let values: Vec<_> = claims.iter().map(|c| c.normalized_value.as_str()).collect();
        assert_eq!(values, vec!["-5", "-2.5", "3"]);
        assert_eq!(claims[0].raw_span, "-5");
        assert_eq!(claims[0].unit.as_deref(), Some("%"));
    }

    #[test]
    fn hyphenated_ranges_are_not_negative() {
        let claims = extract("Between 10-20 people attended.");
        let values: Vec<_> = claims.iter().map(|c| c.normalized_value.as_str()).collect();
        assert_eq!(values, vec!["10", "20"]);
    }

    #[test]
    fn iso_dates_are_single_claims() {
        let claims = extract("It was founded on 2020-05-01 with 12 staff.");
        assert_eq!(
            spans(&claims),
            vec![("2020-05-01", ClaimType::Date), ("12", ClaimType::Numeric)]
        );
        assert_eq!(claims[0].normalized_value, "2020-05-01");
        assert!(extract("Code 2020-13-45 is not a date.")
            .iter()
            .all(|c| c.claim_type != ClaimType::Date));
    }

    // Forces every literal pattern static
    #[test]
    fn static_patterns_compile() {
        for pattern in [&NUMBER, &ISO_DATE, &PERCENT, &UNIT_WORD, &QUOTED, &CAPITALISED] {
            assert!(!pattern.as_str().is_empty());
        }
    }

    #[test]
    fn months_ignored() {
        let claims = extract("Work began in March with partners.");
        assert!(claims.is_empty());
    }

    #[test]
    fn quoted_spans_are_entities() {
        let claims = extract(r#"The programme is called "Bright futures" locally."#);
        assert_eq!(spans(&claims), vec![("Bright futures", ClaimType::Entity)]);
    }

    #[test]
    fn min_numeric_value_filters() {
        let block = ContentBlock::generated("s", "We ran 3 programs for 400 families.");
        let extractor = ClaimExtractor::new(&ExtractorConfig::new().with_min_numeric_value(10.0));
        let claims = extractor.extract(&block, BlockRef::of(0, &block));
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].normalized_value, "400");
    }

    #[test]
    fn extract_all_skips_non_factual_blocks() {
        let blocks = vec![
            ContentBlock::generated("a", "It served 10 people."),
            ContentBlock::fallback("b", "It served 20 people."),
            ContentBlock::generated("c", "It served 30 people."),
        ];
        let claims = ClaimExtractor::default().extract_all(&blocks);
        let refs: Vec<_> = claims.iter().map(|c| c.block_ref.index).collect();
        assert_eq!(refs, vec![0, 2]);
    }

    #[test]
    fn sentence_indices_recorded() {
        let claims = extract("It served 10 people. Then 20 more joined.");
        assert_eq!(claims.iter().map(|c| c.sentence).collect::<Vec<_>>(), vec![0, 1]);
    }
}
