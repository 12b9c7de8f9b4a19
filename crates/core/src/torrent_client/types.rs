//! Types for download daemon operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One hash that failed inside a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    pub hash: String,
    pub reason: String,
}

fn format_failures(failed: &[BatchItemFailure]) -> String {
    failed
        .iter()
        .map(|f| format!("{} ({})", f.hash, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during download daemon operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Download client unavailable: {0}")]
    ClientUnavailable(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid magnet link: {0}")]
    InvalidMagnet(String),

    #[error("No file in torrent {0} matched the requested episodes")]
    NoMatchingFiles(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("{} of {total} torrents failed: {}", .failed.len(), format_failures(.failed))]
    PartialBatchFailure {
        failed: Vec<BatchItemFailure>,
        total: usize,
    },

    #[error("All torrents failed: {}", format_failures(.failed))]
    TotalBatchFailure { failed: Vec<BatchItemFailure> },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TorrentClientError {
    /// Hashes named by a batch failure, empty for every other error.
    pub fn failed_hashes(&self) -> Vec<&str> {
        match self {
            TorrentClientError::PartialBatchFailure { failed, .. }
            | TorrentClientError::TotalBatchFailure { failed } => {
                failed.iter().map(|f| f.hash.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// State of a torrent as reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Fetching data from peers (including stalled/queued/checking downloads).
    Downloading,
    /// Complete and uploading.
    Seeding,
    /// Stopped by the user.
    Paused,
    /// Anything the daemon reports that we do not model.
    Unknown,
}

impl TorrentState {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Downloading => "downloading",
            TorrentState::Seeding => "seeding",
            TorrentState::Paused => "paused",
            TorrentState::Unknown => "unknown",
        }
    }
}

/// A torrent tracked by the daemon. Always fetched fresh, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Current state.
    pub state: TorrentState,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// Current download speed in bytes/second.
    pub download_speed: u64,
    /// Current upload speed in bytes/second.
    pub upload_speed: u64,
    /// ETA in seconds (None if unknown or complete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
    /// Directory the torrent was saved into.
    pub save_path: String,
    /// Absolute path of the torrent's content (root folder or single file).
    pub content_path: String,
}

/// A file inside a torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Index of the file inside the torrent.
    pub index: usize,
    /// Path relative to the torrent root.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Whether the daemon is set to download this file.
    pub wanted: bool,
}

impl TorrentFile {
    /// Last path component of the file.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

/// Request to add one or more magnets to the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct AddTorrentRequest {
    /// Magnet URIs.
    pub uris: Vec<String>,
    /// Absolute save directory.
    pub destination: String,
    /// Start paused.
    pub paused: bool,
}

impl AddTorrentRequest {
    /// Create a request for the given magnets with default options.
    pub fn magnets(uris: Vec<String>, destination: impl Into<String>) -> Self {
        Self {
            uris,
            destination: destination.into(),
            paused: false,
        }
    }

    /// Set whether to start paused.
    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }
}

/// Trait for download daemon backends.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Whether the daemon answers requests right now.
    async fn is_running(&self) -> bool;

    /// Bring the daemon up if it is not answering.
    async fn start(&self) -> Result<(), TorrentClientError>;

    /// Add magnets to the daemon.
    async fn add_torrents(&self, request: AddTorrentRequest) -> Result<(), TorrentClientError>;

    /// List every torrent the daemon tracks.
    async fn list_torrents(&self) -> Result<Vec<TorrentInfo>, TorrentClientError>;

    /// Check whether the daemon tracks a torrent.
    async fn torrent_exists(&self, hash: &str) -> Result<bool, TorrentClientError>;

    /// List the files of a tracked torrent.
    ///
    /// Returns an empty list while the daemon is still fetching metadata.
    async fn get_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError>;

    /// Mark file indices as wanted (download) or unwanted (skip).
    async fn set_file_priority(
        &self,
        hash: &str,
        indices: &[usize],
        wanted: bool,
    ) -> Result<(), TorrentClientError>;

    /// Pause a torrent.
    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    /// Resume a paused torrent.
    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    /// Remove a torrent.
    /// If `delete_files` is true, also delete downloaded files.
    async fn remove_torrent(&self, hash: &str, delete_files: bool)
        -> Result<(), TorrentClientError>;
}

/// Extract the info hash from a magnet URI.
pub fn extract_hash_from_magnet(magnet: &str) -> Option<String> {
    let (_, query) = magnet.split_once('?')?;

    query
        .split('&')
        .find_map(|param| param.strip_prefix("xt=urn:btih:"))
        .filter(|hash| !hash.is_empty())
        .map(|hash| hash.to_lowercase())
}
