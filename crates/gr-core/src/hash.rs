//! Content fingerprints
//!
//! [`ContentHash`] is a Blake3 digest. Rendered validation reports are
//! fingerprinted with it so repeated runs over identical inputs can be
//! compared, and output filenames take its short form when two entities
//! sanitize to the same name.

use std::fmt::{self, Display, Formatter};

/// A 32-byte Blake3 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// First 8 hex chars, for log lines and filename suffixes
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
