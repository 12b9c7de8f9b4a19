//! Pre-match table: destination directory → catalog id.
//!
//! Recorded when a download starts for a known catalog entry, so the library
//! scanner can attribute files under that directory without fuzzy title
//! matching. Lookups are by whole path segment on normalized paths.

mod path;
mod sqlite;
mod types;

pub use path::{is_path_prefix, longest_prefix_match, normalize_path};
pub use sqlite::SqlitePreMatchStore;
pub use types::*;

use crate::platform::MediaId;

/// Trait for pre-match storage.
pub trait PreMatchStore: Send + Sync {
    /// Record that `destination` belongs to `media_id`.
    ///
    /// The destination is normalized first. Saving an existing destination
    /// overwrites its catalog id and keeps its creation time.
    fn save(&self, destination: &str, media_id: MediaId) -> Result<PreMatch, PreMatchError>;

    /// Get an entry by row id.
    fn get(&self, id: i64) -> Result<PreMatch, PreMatchError>;

    /// Exact lookup after normalization.
    fn get_by_destination(&self, destination: &str) -> Result<Option<PreMatch>, PreMatchError>;

    /// Catalog id of the most specific stored destination containing `file_path`.
    fn get_for_path(&self, file_path: &str) -> Result<Option<MediaId>, PreMatchError>;

    /// Every entry, oldest first.
    fn get_all(&self) -> Result<Vec<PreMatch>, PreMatchError>;

    /// Delete by row id. Fails with `NotFound` if no such row exists.
    fn delete_by_id(&self, id: i64) -> Result<(), PreMatchError>;

    /// Delete by destination. Returns whether a row was removed.
    fn delete_by_destination(&self, destination: &str) -> Result<bool, PreMatchError>;

    /// Delete entries created more than `days` days ago. Returns the count.
    fn delete_older_than(&self, days: u32) -> Result<usize, PreMatchError>;

    /// Delete everything. Returns the count.
    fn clear_all(&self) -> Result<usize, PreMatchError>;
}
