//! Mock download daemon for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::torrent_client::{
    extract_hash_from_magnet, AddTorrentRequest, TorrentClient, TorrentClientError, TorrentFile,
    TorrentInfo, TorrentState,
};

/// Mock implementation of the TorrentClient trait.
///
/// Provides controllable behavior for testing:
/// - A daemon that can be "down" until `start` is called
/// - A catalogue of files each magnet resolves to once added
/// - Recorded adds and removals for assertions
/// - Per-hash action failures for batch tests
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client.set_catalog_files("abc123", vec![fixtures::torrent_file(0, "Show - 01.mkv", 10)]).await;
///
/// gateway.add_magnets(vec![fixtures::magnet_for("abc123")], "/library/Show").await?;
///
/// assert_eq!(client.added_requests().await.len(), 1);
/// assert_eq!(client.files("abc123").await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    running: Arc<RwLock<bool>>,
    start_succeeds: Arc<RwLock<bool>>,
    start_calls: Arc<RwLock<u32>>,
    /// Tracked torrents, in the order the daemon lists them.
    torrents: Arc<RwLock<Vec<TorrentInfo>>>,
    /// File lists of tracked torrents by hash.
    files: Arc<RwLock<HashMap<String, Vec<TorrentFile>>>>,
    /// Files a magnet resolves to when added.
    catalog: Arc<RwLock<HashMap<String, Vec<TorrentFile>>>>,
    added: Arc<RwLock<Vec<AddTorrentRequest>>>,
    removed: Arc<RwLock<Vec<String>>>,
    /// Hashes whose pause/resume/remove calls fail.
    failing: Arc<RwLock<HashSet<String>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    /// Create a running mock daemon with nothing tracked.
    pub fn new() -> Self {
        Self {
            running: Arc::new(RwLock::new(true)),
            start_succeeds: Arc::new(RwLock::new(true)),
            start_calls: Arc::new(RwLock::new(0)),
            torrents: Arc::new(RwLock::new(Vec::new())),
            files: Arc::new(RwLock::new(HashMap::new())),
            catalog: Arc::new(RwLock::new(HashMap::new())),
            added: Arc::new(RwLock::new(Vec::new())),
            removed: Arc::new(RwLock::new(Vec::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Bring the simulated daemon up or down.
    pub async fn set_running(&self, running: bool) {
        *self.running.write().await = running;
    }

    /// Control whether `start` brings the daemon up.
    pub async fn set_start_succeeds(&self, succeeds: bool) {
        *self.start_succeeds.write().await = succeeds;
    }

    /// Number of `start` calls so far.
    pub async fn start_calls(&self) -> u32 {
        *self.start_calls.read().await
    }

    /// Register the files a magnet with this hash resolves to.
    pub async fn set_catalog_files(&self, hash: &str, files: Vec<TorrentFile>) {
        self.catalog.write().await.insert(hash.to_string(), files);
    }

    /// Track a torrent directly, replacing any torrent with the same hash.
    ///
    /// Catalogue files for the hash become its file list.
    pub async fn add_torrent_info(&self, info: TorrentInfo) {
        let files = self.catalog.read().await.get(&info.hash).cloned();
        if let Some(files) = files {
            self.files.write().await.insert(info.hash.clone(), files);
        }

        let mut torrents = self.torrents.write().await;
        torrents.retain(|t| t.hash != info.hash);
        torrents.push(info);
    }

    /// Make pause/resume/remove fail for a hash.
    pub async fn fail_hash(&self, hash: &str) {
        self.failing.write().await.insert(hash.to_string());
    }

    /// Make the next operation fail with the given error.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// All recorded add requests.
    pub async fn added_requests(&self) -> Vec<AddTorrentRequest> {
        self.added.read().await.clone()
    }

    /// Hashes removed so far, in call order.
    pub async fn removed_hashes(&self) -> Vec<String> {
        self.removed.read().await.clone()
    }

    pub async fn is_tracked(&self, hash: &str) -> bool {
        self.torrents.read().await.iter().any(|t| t.hash == hash)
    }

    pub async fn torrent_state(&self, hash: &str) -> Option<TorrentState> {
        self.torrents
            .read()
            .await
            .iter()
            .find(|t| t.hash == hash)
            .map(|t| t.state)
    }

    /// Current file list of a tracked torrent.
    pub async fn files(&self, hash: &str) -> Vec<TorrentFile> {
        self.files.read().await.get(hash).cloned().unwrap_or_default()
    }

    async fn check_available(&self) -> Result<(), TorrentClientError> {
        if !*self.running.read().await {
            return Err(TorrentClientError::ConnectionFailed(
                "mock daemon is not running".to_string(),
            ));
        }
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        Ok(())
    }

    async fn check_action(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.check_available().await?;
        if self.failing.read().await.contains(hash) {
            return Err(TorrentClientError::ApiError(format!(
                "simulated failure for {}",
                hash
            )));
        }
        if !self.is_tracked(hash).await {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        }
        Ok(())
    }

    async fn set_state(&self, hash: &str, state: TorrentState) {
        if let Some(torrent) = self
            .torrents
            .write()
            .await
            .iter_mut()
            .find(|t| t.hash == hash)
        {
            torrent.state = state;
        }
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    async fn start(&self) -> Result<(), TorrentClientError> {
        *self.start_calls.write().await += 1;
        if *self.start_succeeds.read().await {
            *self.running.write().await = true;
            Ok(())
        } else {
            Err(TorrentClientError::ClientUnavailable(
                "mock daemon refused to start".to_string(),
            ))
        }
    }

    async fn add_torrents(&self, request: AddTorrentRequest) -> Result<(), TorrentClientError> {
        self.check_available().await?;
        self.added.write().await.push(request.clone());

        for uri in &request.uris {
            let Some(hash) = extract_hash_from_magnet(uri) else {
                continue;
            };
            if self.is_tracked(&hash).await {
                continue;
            }

            let state = if request.paused {
                TorrentState::Paused
            } else {
                TorrentState::Downloading
            };
            self.add_torrent_info(TorrentInfo {
                hash: hash.clone(),
                name: hash.clone(),
                state,
                progress: 0.0,
                size_bytes: 0,
                download_speed: 0,
                upload_speed: 0,
                eta_secs: None,
                save_path: request.destination.clone(),
                content_path: request.destination.clone(),
            })
            .await;
        }
        Ok(())
    }

    async fn list_torrents(&self) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        self.check_available().await?;
        Ok(self.torrents.read().await.clone())
    }

    async fn torrent_exists(&self, hash: &str) -> Result<bool, TorrentClientError> {
        self.check_available().await?;
        Ok(self.is_tracked(hash).await)
    }

    async fn get_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        self.check_available().await?;
        if !self.is_tracked(hash).await {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        }
        Ok(self.files(hash).await)
    }

    async fn set_file_priority(
        &self,
        hash: &str,
        indices: &[usize],
        wanted: bool,
    ) -> Result<(), TorrentClientError> {
        self.check_available().await?;
        let mut files = self.files.write().await;
        let Some(files) = files.get_mut(hash) else {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        };

        for file in files.iter_mut().filter(|f| indices.contains(&f.index)) {
            file.wanted = wanted;
        }
        Ok(())
    }

    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.check_action(hash).await?;
        self.set_state(hash, TorrentState::Paused).await;
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.check_action(hash).await?;
        self.set_state(hash, TorrentState::Downloading).await;
        Ok(())
    }

    async fn remove_torrent(
        &self,
        hash: &str,
        _delete_files: bool,
    ) -> Result<(), TorrentClientError> {
        self.check_action(hash).await?;
        self.torrents.write().await.retain(|t| t.hash != hash);
        self.files.write().await.remove(hash);
        self.removed.write().await.push(hash.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{magnet_for, torrent_file};

    #[tokio::test]
    async fn test_add_resolves_catalog_files() {
        let client = MockTorrentClient::new();
        client
            .set_catalog_files("abc", vec![torrent_file(0, "Show - 01.mkv", 10)])
            .await;

        client
            .add_torrents(AddTorrentRequest::magnets(vec![magnet_for("abc")], "/library/Show"))
            .await
            .unwrap();

        assert_eq!(client.get_files("abc").await.unwrap().len(), 1);
        assert_eq!(
            client.torrent_state("abc").await,
            Some(TorrentState::Downloading)
        );
    }

    #[tokio::test]
    async fn test_down_daemon_comes_back_on_start() {
        let client = MockTorrentClient::new();
        client.set_running(false).await;

        assert!(client.list_torrents().await.is_err());
        client.start().await.unwrap();
        assert!(client.list_torrents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let client = MockTorrentClient::new();
        client.set_next_error(TorrentClientError::Timeout).await;

        assert!(client.list_torrents().await.is_err());
        assert!(client.list_torrents().await.is_ok());
    }
}
