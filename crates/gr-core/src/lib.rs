//! Grounded Report Core
//!
//! Shared data model for the grounding pipeline:
//! - Source records and their addresses
//! - Content blocks produced by generation or templates
//! - Content fingerprints for report idempotence checks
//! - Leaf error types raised by external collaborators

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod block;
pub mod error;
pub mod hash;
pub mod record;

pub use block::{BlockOrigin, BlockRef, ContentBlock, InsertionId};
pub use error::{GenerationError, SchemaError};
pub use hash::ContentHash;
pub use record::{FieldValue, SourceAddress, SourceRecord};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the core model
    pub use crate::{
        BlockOrigin, BlockRef, ContentBlock, ContentHash, FieldValue, GenerationError,
        InsertionId, SchemaError, SourceAddress, SourceRecord,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
