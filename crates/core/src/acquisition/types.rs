//! Acquisition request, outcome and error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::{BaseAnime, CompleteAnime, MediaId};
use crate::prematch::PreMatchError;
use crate::torrent_client::{SelectionPlan, TorrentClientError, TorrentState};

/// A torrent as returned by a search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTorrent {
    pub name: String,
    #[serde(default)]
    pub info_hash: String,
    /// Name of the provider that can resolve this torrent's magnet link.
    pub provider: String,
    /// Magnet link, when the search result already carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnet_link: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartSelectOptions {
    #[serde(default)]
    pub enabled: bool,
    /// Episodes to download, usually the ones missing from the library.
    #[serde(default, alias = "missingEpisodeNumbers")]
    pub episode_numbers: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeselectOptions {
    #[serde(default)]
    pub enabled: bool,
    /// File indices to skip.
    #[serde(default)]
    pub indices: Vec<usize>,
}

/// "Download these torrents to this destination for this catalog entry."
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Session on whose behalf the request runs. Empty means the default platform.
    #[serde(default)]
    pub session_id: String,
    pub torrents: Vec<ProviderTorrent>,
    pub destination: String,
    #[serde(default)]
    pub smart_select: SmartSelectOptions,
    #[serde(default)]
    pub deselect: DeselectOptions,
    /// Partial metadata supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<BaseAnime>,
}

impl DownloadRequest {
    /// Smart select takes precedence over deselect.
    pub fn mode(&self) -> AcquisitionMode {
        if self.smart_select.enabled {
            AcquisitionMode::SmartSelect
        } else if self.deselect.enabled {
            AcquisitionMode::Deselect
        } else {
            AcquisitionMode::Plain
        }
    }

    /// Catalog id to record a pre-match for, if any.
    pub fn media_id(&self) -> Option<MediaId> {
        self.media.as_ref().map(|m| m.id).filter(|id| *id > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    Plain,
    SmartSelect,
    Deselect,
}

impl AcquisitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::Plain => "plain",
            AcquisitionMode::SmartSelect => "smart_select",
            AcquisitionMode::Deselect => "deselect",
        }
    }
}

/// Where a request's catalog metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// Full metadata fetched from the remote platform.
    Platform,
    /// The partial metadata sent with the request.
    Request,
}

/// What a successful download request did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub mode: AcquisitionMode,
    /// Magnet links handed to the daemon.
    pub magnets: Vec<String>,
    /// File selection, for smart select and deselect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<MediaId>,
    /// Metadata the request ran with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<CompleteAnime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_source: Option<MetadataSource>,
    /// Requested episodes past the entry's known episode count, left out of
    /// the selection.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_episodes: Vec<u32>,
    /// Whether the destination was recorded in the pre-match table.
    pub pre_match_saved: bool,
}

/// Download state of one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDownloadStatus {
    pub media_id: MediaId,
    pub status: TorrentState,
    pub progress: f64,
}

/// Errors from acquisition requests.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Malformed or contradictory request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// The download daemon could not be reached, even after a restart.
    #[error("Download client unavailable: {0}")]
    ClientUnavailable(String),

    #[error("No provider registered as '{0}'")]
    ProviderNotFound(String),

    /// A provider failed to resolve a magnet link.
    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error(transparent)]
    TorrentClient(TorrentClientError),

    #[error(transparent)]
    PreMatch(#[from] PreMatchError),
}

impl From<TorrentClientError> for AcquisitionError {
    fn from(e: TorrentClientError) -> Self {
        match e {
            TorrentClientError::InvalidDestination(msg) => AcquisitionError::InvalidDestination(msg),
            TorrentClientError::ClientUnavailable(msg) => AcquisitionError::ClientUnavailable(msg),
            other => AcquisitionError::TorrentClient(other),
        }
    }
}
