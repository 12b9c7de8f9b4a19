//! Types for the remote metadata platform.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog identifier on the remote platform.
pub type MediaId = i32;

/// Errors from the remote metadata platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Media does not exist on the platform.
    #[error("Media not found: {0}")]
    NotFound(MediaId),
}

/// The authenticated account on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub id: i32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_image: Option<String>,
}

/// Status of an entry in the user's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaListStatus {
    Current,
    Planning,
    Completed,
    Dropped,
    Paused,
    Repeating,
}

impl MediaListStatus {
    /// Wire value used by the GraphQL API.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaListStatus::Current => "CURRENT",
            MediaListStatus::Planning => "PLANNING",
            MediaListStatus::Completed => "COMPLETED",
            MediaListStatus::Dropped => "DROPPED",
            MediaListStatus::Paused => "PAUSED",
            MediaListStatus::Repeating => "REPEATING",
        }
    }
}

/// Summary metadata for one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAnime {
    pub id: MediaId,
    pub title: String,
    /// Total episode count, unknown while airing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl BaseAnime {
    /// Promote to full metadata with no known relations.
    pub fn to_complete_anime(&self) -> CompleteAnime {
        CompleteAnime {
            anime: self.clone(),
            relations: Vec::new(),
        }
    }
}

/// A catalog entry together with its related entries (sequels, prequels...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAnime {
    #[serde(flatten)]
    pub anime: BaseAnime,
    #[serde(default)]
    pub relations: Vec<BaseAnime>,
}

impl CompleteAnime {
    pub fn id(&self) -> MediaId {
        self.anime.id
    }
}

/// One entry of the user's tracked collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeListEntry {
    pub media: BaseAnime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MediaListStatus>,
    #[serde(default)]
    pub progress: u32,
}

/// The user's tracked collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimeCollection {
    pub entries: Vec<AnimeListEntry>,
}

impl AnimeCollection {
    pub fn find_anime(&self, media_id: MediaId) -> Option<&AnimeListEntry> {
        self.entries.iter().find(|e| e.media.id == media_id)
    }

    pub fn contains(&self, media_id: MediaId) -> bool {
        self.find_anime(media_id).is_some()
    }
}

/// Public view of who a request is acting as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<Viewer>,
    /// `"HIDDEN"` for authenticated users, empty for guests.
    pub token: String,
    pub is_simulated: bool,
}

impl User {
    /// The guest user.
    pub fn simulated() -> Self {
        Self {
            viewer: None,
            token: String::new(),
            is_simulated: true,
        }
    }
}

/// Status and progress to write so that progress never exceeds the total.
///
/// Reaching the total episode count completes the entry.
pub fn progress_status(progress: u32, total_episodes: Option<u32>) -> (u32, MediaListStatus) {
    match total_episodes {
        Some(total) if total > 0 && progress >= total => (total, MediaListStatus::Completed),
        _ => (progress, MediaListStatus::Current),
    }
}
