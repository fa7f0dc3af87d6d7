//! Grounded Report Facts
//!
//! Turns source records into the normalized [`FactIndex`] that every
//! grounding check resolves against.
//!
//! # Example
//!
//! ```rust
//! use gr_core::{SourceAddress, SourceRecord};
//! use gr_facts::{FactIndex, FactKind};
//!
//! let records = vec![
//!     SourceRecord::new(SourceAddress::new("impact.xlsx").with_row(2), "Acme", "served", 1000.0)
//!         .with_unit("people"),
//! ];
//! let index = FactIndex::build(&records);
//! assert_eq!(index.lookup_in_entity("acme", FactKind::Numeric, "1000").count(), 1);
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod fact;
pub mod index;
pub mod normalize;

pub use fact::{Fact, FactKey, FactKind};
pub use index::{FactIndex, IndexStats, KnownName, MAX_NAME_WORDS};
pub use normalize::{
    contains_words, normalize_date, normalize_number, normalize_text, normalize_unit,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
