//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every collaborator trait,
//! so sessions, acquisitions and status aggregation can be exercised
//! without a download daemon or the remote platform.
//!
//! # Example
//!
//! ```rust,ignore
//! use tsundoku_core::testing::{fixtures, MockPlatformBackend, MockTorrentClient};
//!
//! let torrent_client = Arc::new(MockTorrentClient::new());
//! let platform = Arc::new(MockPlatformBackend::new());
//!
//! // Configure mock responses
//! torrent_client.set_catalog_files("abc", vec![fixtures::torrent_file(0, "Show - 01.mkv", 10)]).await;
//! platform.set_viewer("token", fixtures::viewer("alice")).await;
//!
//! // Wire into a SessionRegistry / DownloadClientGateway...
//! ```

mod mock_acquisition;
mod mock_platform;
mod mock_torrent_client;

pub use mock_acquisition::{MockMagnetProvider, RecordingEventSink};
pub use mock_platform::{MockPlatformBackend, MockPlatformClient, ProgressUpdate};
pub use mock_torrent_client::MockTorrentClient;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::acquisition::ProviderTorrent;
    use crate::platform::{BaseAnime, CompleteAnime, MediaId, Viewer};
    use crate::torrent_client::{TorrentFile, TorrentInfo, TorrentState};

    /// Magnet link whose info hash is `hash`.
    pub fn magnet_for(hash: &str) -> String {
        format!("magnet:?xt=urn:btih:{}&dn={}", hash, hash)
    }

    /// A wanted file entry.
    pub fn torrent_file(index: usize, path: &str, size_bytes: u64) -> TorrentFile {
        TorrentFile {
            index,
            path: path.to_string(),
            size_bytes,
            wanted: true,
        }
    }

    /// A half-done downloading torrent saved at `content_path`.
    pub fn torrent_info(hash: &str, content_path: &str) -> TorrentInfo {
        TorrentInfo {
            hash: hash.to_string(),
            name: format!("Torrent {}", hash),
            state: TorrentState::Downloading,
            progress: 0.5,
            size_bytes: 1024 * 1024 * 700, // 700 MB
            download_speed: 1024 * 512,
            upload_speed: 1024 * 64,
            eta_secs: Some(600),
            save_path: content_path.to_string(),
            content_path: content_path.to_string(),
        }
    }

    pub fn viewer(name: &str) -> Viewer {
        Viewer {
            id: 1,
            name: name.to_string(),
            avatar: None,
            banner_image: None,
        }
    }

    pub fn base_anime(id: MediaId, title: &str, episodes: Option<u32>) -> BaseAnime {
        BaseAnime {
            id,
            title: title.to_string(),
            episodes,
            format: Some("TV".to_string()),
            status: Some("FINISHED".to_string()),
        }
    }

    pub fn complete_anime(id: MediaId, title: &str, episodes: Option<u32>) -> CompleteAnime {
        base_anime(id, title, episodes).to_complete_anime()
    }

    /// A search result from `provider` with no magnet link attached.
    pub fn provider_torrent(provider: &str, info_hash: &str) -> ProviderTorrent {
        ProviderTorrent {
            name: format!("[Group] Show - {}", info_hash),
            info_hash: info_hash.to_string(),
            provider: provider.to_string(),
            magnet_link: None,
            size_bytes: 1024 * 1024 * 700,
        }
    }
}
