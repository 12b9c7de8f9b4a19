//! Types for the pre-match table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::MediaId;

/// A destination directory bound to a catalog entry at download time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreMatch {
    /// Surrogate row id.
    pub id: i64,
    /// Normalized destination path.
    pub destination: String,
    /// Catalog entry the destination belongs to.
    pub media_id: MediaId,
    /// When the destination was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the catalog id was last written.
    pub updated_at: DateTime<Utc>,
}

/// Errors from the pre-match store.
#[derive(Debug, Error)]
pub enum PreMatchError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Pre-match not found: {0}")]
    NotFound(String),
}
