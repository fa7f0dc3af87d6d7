//! Output paths and exclusive ownership
//!
//! A document path belongs to one run at a time. Runs claim the path
//! before writing and release it when the [`OutputClaim`] drops.
//!
//! Entity names are sanitized into filename stems. The first entity to
//! take a stem keeps it; a different entity sanitizing to the same stem
//! gets a short content-hash suffix instead of overwriting.

use crate::error::PipelineError;
use chrono::NaiveDate;
use gr_core::ContentHash;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Paths currently being written, keyed to the owning run
#[derive(Debug, Default)]
pub struct OutputRegistry {
    claimed: DashMap<PathBuf, Uuid>,
    stems: DashMap<String, String>,
}

impl OutputRegistry {
    /// Create an empty shared registry
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `path` for `run_id`
    ///
    /// # Errors
    /// Returns [`PipelineError::OutputClaimed`] if another run owns it
    pub fn claim(self: &Arc<Self>, path: &Path, run_id: Uuid) -> Result<OutputClaim, PipelineError> {
        match self.claimed.entry(path.to_path_buf()) {
            Entry::Occupied(owner) => {
                tracing::warn!("Output {} already claimed by run {}", path.display(), owner.get());
                Err(PipelineError::OutputClaimed(path.to_path_buf()))
            }
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Ok(OutputClaim {
                    registry: Arc::clone(self),
                    path: path.to_path_buf(),
                })
            }
        }
    }

    /// Filename stem for `entity`, unique among entities seen so far
    #[must_use]
    pub fn entity_stem(&self, entity: &str) -> String {
        let entity = entity.trim();
        let stem = sanitize_entity(entity);
        match self.stems.entry(stem.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entity.to_string());
                stem
            }
            Entry::Occupied(owner) if owner.get() == entity => stem,
            Entry::Occupied(owner) => {
                let suffixed = format!("{stem}-{}", ContentHash::compute(entity.as_bytes()).short());
                tracing::warn!(
                    "Entity '{}' sanitizes to '{}' already used by '{}', writing as '{}'",
                    entity,
                    stem,
                    owner.get(),
                    suffixed
                );
                suffixed
            }
        }
    }

    /// Whether `path` is currently claimed
    #[must_use]
    pub fn is_claimed(&self, path: &Path) -> bool {
        self.claimed.contains_key(path)
    }
}

/// Exclusive ownership of one output path
#[derive(Debug)]
pub struct OutputClaim {
    registry: Arc<OutputRegistry>,
    path: PathBuf,
}

impl OutputClaim {
    /// Claimed path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputClaim {
    fn drop(&mut self) {
        self.registry.claimed.remove(&self.path);
    }
}

/// Filesystem-safe form of an entity name
#[must_use]
pub fn sanitize_entity(entity: &str) -> String {
    let cleaned: String = entity
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "report".to_string()
    } else {
        cleaned
    }
}

/// Expand `{entity}` and `{date}` in a filename pattern
///
/// `stem` is used as given; see [`OutputRegistry::entity_stem`].
#[must_use]
pub fn output_filename(pattern: &str, stem: &str, date: NaiveDate) -> String {
    pattern
        .replace("{entity}", stem)
        .replace("{date}", &date.format("%Y%m%d").to_string())
}

/// Sibling artifact path: `<stem>_<suffix>`
#[must_use]
pub fn sibling_path(document: &Path, suffix: &str) -> PathBuf {
    let stem = document
        .file_stem()
        .map_or_else(|| "report".into(), |s| s.to_string_lossy().into_owned());
    document.with_file_name(format!("{stem}_{suffix}"))
}
