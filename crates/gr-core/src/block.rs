//! Content blocks
//!
//! A [`ContentBlock`] is one unit of output text bound to an insertion
//! rule. Blocks live for a single validation pass; they are never
//! persisted beyond the emitted report.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identifier of an insertion rule (and of the blocks it produces)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsertionId(String);

impl InsertionId {
    /// Create a new insertion id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InsertionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InsertionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InsertionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// How a block came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockOrigin {
    /// Produced by the text generator
    Generated,
    /// Rendered from a static template
    Template,
    /// Rendered structured table
    Table,
    /// Fallback text used when source data was missing
    Fallback,
    /// Traceability appendix
    Appendix,
}

/// One generated or templated unit of output text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Rule that produced this block
    pub insertion_id: InsertionId,
    /// Text as it will be written to the document
    pub raw_text: String,
    /// Whether grounding applies to this block at all
    pub is_factual: bool,
    /// Entity the block is written about, used for tie-breaks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_entity: Option<String>,
    /// Where the text came from
    pub origin: BlockOrigin,
}

impl ContentBlock {
    /// Factual block produced by the generator
    #[must_use]
    pub fn generated(insertion_id: impl Into<InsertionId>, raw_text: impl Into<String>) -> Self {
        Self {
            insertion_id: insertion_id.into(),
            raw_text: raw_text.into(),
            is_factual: true,
            subject_entity: None,
            origin: BlockOrigin::Generated,
        }
    }

    /// Block rendered from a static template
    ///
    /// Non-factual by default: the text is interpolated verbatim from
    /// source values. Use [`ContentBlock::factual`] to ground it anyway.
    #[must_use]
    pub fn template(insertion_id: impl Into<InsertionId>, raw_text: impl Into<String>) -> Self {
        Self {
            is_factual: false,
            origin: BlockOrigin::Template,
            ..Self::generated(insertion_id, raw_text)
        }
    }

    /// Rendered table block, non-factual by default
    #[must_use]
    pub fn table(insertion_id: impl Into<InsertionId>, raw_text: impl Into<String>) -> Self {
        Self {
            is_factual: false,
            origin: BlockOrigin::Table,
            ..Self::generated(insertion_id, raw_text)
        }
    }

    /// Non-factual fallback block
    #[must_use]
    pub fn fallback(insertion_id: impl Into<InsertionId>, raw_text: impl Into<String>) -> Self {
        Self {
            is_factual: false,
            origin: BlockOrigin::Fallback,
            ..Self::generated(insertion_id, raw_text)
        }
    }

    /// Non-factual appendix block
    #[must_use]
    pub fn appendix(insertion_id: impl Into<InsertionId>, raw_text: impl Into<String>) -> Self {
        Self {
            is_factual: false,
            origin: BlockOrigin::Appendix,
            ..Self::generated(insertion_id, raw_text)
        }
    }

    /// Set the subject entity
    #[inline]
    #[must_use]
    pub fn with_subject(mut self, entity: impl Into<String>) -> Self {
        self.subject_entity = Some(entity.into());
        self
    }

    /// Mark as non-factual filler
    #[inline]
    #[must_use]
    pub fn non_factual(mut self) -> Self {
        self.is_factual = false;
        self
    }

    /// Subject the block to grounding
    #[inline]
    #[must_use]
    pub fn factual(mut self) -> Self {
        self.is_factual = true;
        self
    }
}

/// Reference from a claim back to the block it was parsed from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRef {
    /// Position of the block in the validated set
    pub index: usize,
    /// Rule id of the block
    pub insertion_id: InsertionId,
}

impl BlockRef {
    /// Reference block `index` of `blocks`
    #[must_use]
    pub fn of(index: usize, block: &ContentBlock) -> Self {
        Self {
            index,
            insertion_id: block.insertion_id.clone(),
        }
    }
}

impl Display for BlockRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.insertion_id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_blocks_are_not_factual() {
        let block = ContentBlock::fallback("risks", "[data unavailable]");
        assert!(!block.is_factual);
        assert_eq!(block.origin, BlockOrigin::Fallback);
    }

    #[test]
    fn block_ref_display() {
        let block = ContentBlock::generated("summary", "text").with_subject("Acme");
        assert_eq!(BlockRef::of(2, &block).to_string(), "summary#2");
        assert_eq!(block.subject_entity.as_deref(), Some("Acme"));
    }
}
