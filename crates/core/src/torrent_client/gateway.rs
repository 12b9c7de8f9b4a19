//! Download-client gateway.
//!
//! Wraps one [`TorrentClient`] with the policies callers rely on: a single
//! restart-then-retry when listing fails, absolute-path checks, transient
//! transient peek adds, aggregate batch errors and smart file selection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics;

use super::smart_select::{plan_deselection, plan_smart_selection, SelectionPlan};
use super::{
    extract_hash_from_magnet, AddTorrentRequest, BatchItemFailure, EpisodeParser, TorrentClient,
    TorrentClientError, TorrentFile, TorrentInfo,
};

/// Default time to wait for a freshly added magnet to resolve its metadata.
pub const DEFAULT_METADATA_WAIT: Duration = Duration::from_secs(60);

/// Default delay between metadata polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-torrent action applied by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentAction {
    Pause,
    Resume,
    Remove,
}

impl TorrentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentAction::Pause => "pause",
            TorrentAction::Resume => "resume",
            TorrentAction::Remove => "remove",
        }
    }
}

/// Download one file per requested episode from a single torrent.
#[derive(Debug, Clone)]
pub struct SmartSelectRequest {
    pub magnet: String,
    pub episode_numbers: Vec<u32>,
    pub destination: String,
}

/// Download a single torrent except for the listed file indices.
#[derive(Debug, Clone)]
pub struct DeselectRequest {
    pub magnet: String,
    pub excluded_indices: Vec<usize>,
    pub destination: String,
}

/// Narrow, policy-carrying façade over one download daemon.
pub struct DownloadClientGateway {
    client: Arc<dyn TorrentClient>,
    parser: Arc<dyn EpisodeParser>,
    metadata_wait: Duration,
    poll_interval: Duration,
}

impl DownloadClientGateway {
    pub fn new(client: Arc<dyn TorrentClient>, parser: Arc<dyn EpisodeParser>) -> Self {
        Self {
            client,
            parser,
            metadata_wait: DEFAULT_METADATA_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override how long to wait for magnet metadata, and how often to poll.
    pub fn with_metadata_wait(mut self, wait: Duration, poll_interval: Duration) -> Self {
        self.metadata_wait = wait;
        self.poll_interval = poll_interval;
        self
    }

    /// Name of the underlying backend.
    pub fn backend(&self) -> &str {
        self.client.name()
    }

    /// Make sure the daemon answers, starting it once if needed.
    pub async fn ensure_running(&self) -> bool {
        if self.client.is_running().await {
            return true;
        }

        info!(backend = self.client.name(), "Download client not running, starting it");
        match self.client.start().await {
            Ok(()) => {
                metrics::DAEMON_RESTARTS.with_label_values(&["success"]).inc();
                true
            }
            Err(e) => {
                metrics::DAEMON_RESTARTS.with_label_values(&["failure"]).inc();
                warn!(backend = self.client.name(), error = %e, "Could not start download client");
                false
            }
        }
    }

    /// List tracked torrents, restarting the daemon and retrying once on failure.
    pub async fn list_active(&self) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        match self.client.list_torrents().await {
            Ok(torrents) => Ok(torrents),
            Err(first) => {
                debug!(error = %first, "Listing torrents failed, checking the daemon");
                if !self.ensure_running().await {
                    return Err(TorrentClientError::ClientUnavailable(first.to_string()));
                }
                self.client.list_torrents().await
            }
        }
    }

    /// Add magnets to an absolute destination.
    pub async fn add_magnets(
        &self,
        magnets: Vec<String>,
        destination: &str,
    ) -> Result<(), TorrentClientError> {
        require_absolute(destination)?;
        if magnets.is_empty() {
            return Ok(());
        }

        let count = magnets.len();
        self.client
            .add_torrents(AddTorrentRequest::magnets(magnets, destination))
            .await?;
        info!(count, destination, "Added torrents");
        Ok(())
    }

    /// Files of a torrent the daemon already tracks.
    pub async fn get_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        self.client.get_files(hash).await
    }

    /// List the files of a magnet without committing to a download.
    ///
    /// Untracked torrents are added paused to a scratch directory and removed
    /// again once listed. A failed removal is logged, the listing still returns.
    pub async fn peek_files(&self, magnet: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        let hash = magnet_hash(magnet)?;

        if self.client.torrent_exists(&hash).await? {
            debug!(hash = %hash, "Torrent already tracked, listing files directly");
            return self.client.get_files(&hash).await;
        }

        let scratch = tempfile::Builder::new()
            .prefix("tsundoku-peek-")
            .tempdir()
            .map_err(|e| TorrentClientError::Internal(format!("scratch directory: {}", e)))?;
        let scratch_path = scratch.path().to_string_lossy().into_owned();

        self.client
            .add_torrents(
                AddTorrentRequest::magnets(vec![magnet.to_string()], scratch_path).with_paused(true),
            )
            .await?;

        let files = self.wait_for_files(&hash).await;

        if let Err(e) = self.client.remove_torrent(&hash, true).await {
            warn!(hash = %hash, error = %e, "Failed to remove peeked torrent");
        }

        files
    }

    /// Mark file indices for download.
    pub async fn select_files(
        &self,
        hash: &str,
        indices: &[usize],
    ) -> Result<(), TorrentClientError> {
        self.client.set_file_priority(hash, indices, true).await
    }

    /// Mark file indices to be skipped.
    pub async fn deselect_files(
        &self,
        hash: &str,
        indices: &[usize],
    ) -> Result<(), TorrentClientError> {
        self.client.set_file_priority(hash, indices, false).await
    }

    pub async fn pause(&self, hashes: &[String]) -> Result<(), TorrentClientError> {
        self.apply_action(TorrentAction::Pause, hashes).await
    }

    pub async fn resume(&self, hashes: &[String]) -> Result<(), TorrentClientError> {
        self.apply_action(TorrentAction::Resume, hashes).await
    }

    /// Remove torrents from the daemon, keeping downloaded data on disk.
    pub async fn remove(&self, hashes: &[String]) -> Result<(), TorrentClientError> {
        self.apply_action(TorrentAction::Remove, hashes).await
    }

    /// Apply an action to every hash concurrently, reporting failures in aggregate.
    ///
    /// Not atomic: hashes that succeed stay changed when others fail.
    pub async fn apply_action(
        &self,
        action: TorrentAction,
        hashes: &[String],
    ) -> Result<(), TorrentClientError> {
        let calls = hashes.iter().map(|hash| async move {
            let result = match action {
                TorrentAction::Pause => self.client.pause_torrent(hash).await,
                TorrentAction::Resume => self.client.resume_torrent(hash).await,
                TorrentAction::Remove => self.client.remove_torrent(hash, false).await,
            };
            (hash, result)
        });

        let mut failed = Vec::new();
        for (hash, result) in futures::future::join_all(calls).await {
            if let Err(e) = result {
                warn!(hash = %hash, action = action.as_str(), error = %e, "Torrent action failed");
                failed.push(BatchItemFailure {
                    hash: hash.clone(),
                    reason: e.to_string(),
                });
            }
        }

        match failed.len() {
            0 => {
                debug!(action = action.as_str(), count = hashes.len(), "Torrent action applied");
                Ok(())
            }
            n if n == hashes.len() => Err(TorrentClientError::TotalBatchFailure { failed }),
            _ => Err(TorrentClientError::PartialBatchFailure {
                failed,
                total: hashes.len(),
            }),
        }
    }

    /// Add a torrent paused, keep only the files for the requested episodes,
    /// then start it.
    ///
    /// When no file matches any requested episode
    /// [`TorrentClientError::NoMatchingFiles`] is returned and a torrent added
    /// by this call is removed again with its data. A torrent the daemon
    /// already tracked is never removed, and only gains wanted files.
    pub async fn smart_select(
        &self,
        request: SmartSelectRequest,
    ) -> Result<SelectionPlan, TorrentClientError> {
        require_absolute(&request.destination)?;
        let hash = magnet_hash(&request.magnet)?;

        let existed = self.client.torrent_exists(&hash).await?;
        let files = self
            .add_paused_and_list(&request.magnet, &hash, &request.destination, existed)
            .await?;
        let plan = plan_smart_selection(&files, &request.episode_numbers, self.parser.as_ref());

        if plan.is_empty() {
            warn!(hash = %hash, episodes = ?request.episode_numbers, "No file matched the requested episodes");
            if existed {
                debug!(hash = %hash, "Torrent was already tracked, leaving it in place");
            } else if let Err(e) = self.client.remove_torrent(&hash, true).await {
                warn!(hash = %hash, error = %e, "Failed to remove unmatched torrent");
            }
            return Err(TorrentClientError::NoMatchingFiles(hash));
        }

        if !plan.missing_episodes.is_empty() {
            info!(hash = %hash, missing = ?plan.missing_episodes, "Some episodes have no matching file");
        }

        self.apply_plan(&hash, &plan, existed).await?;
        info!(
            hash = %hash,
            selected = plan.selected.len(),
            skipped = plan.deselected.len(),
            "Smart select started download"
        );
        Ok(plan)
    }

    /// Add a torrent paused, skip the excluded files, then start it.
    ///
    /// On a torrent the daemon already tracked, the included files are marked
    /// wanted and nothing is skipped.
    pub async fn deselect_and_download(
        &self,
        request: DeselectRequest,
    ) -> Result<SelectionPlan, TorrentClientError> {
        require_absolute(&request.destination)?;
        let hash = magnet_hash(&request.magnet)?;

        let existed = self.client.torrent_exists(&hash).await?;
        let files = self
            .add_paused_and_list(&request.magnet, &hash, &request.destination, existed)
            .await?;
        let plan = plan_deselection(&files, &request.excluded_indices);

        self.apply_plan(&hash, &plan, existed).await?;
        info!(hash = %hash, skipped = plan.deselected.len(), "Deselect download started");
        Ok(plan)
    }

    async fn add_paused_and_list(
        &self,
        magnet: &str,
        hash: &str,
        destination: &str,
        existed: bool,
    ) -> Result<Vec<TorrentFile>, TorrentClientError> {
        if !existed {
            self.client
                .add_torrents(
                    AddTorrentRequest::magnets(vec![magnet.to_string()], destination)
                        .with_paused(true),
                )
                .await?;
        }
        self.wait_for_files(hash).await
    }

    /// Skipping files is limited to torrents added by the current request.
    async fn apply_plan(
        &self,
        hash: &str,
        plan: &SelectionPlan,
        existed: bool,
    ) -> Result<(), TorrentClientError> {
        if !existed {
            self.deselect_files(hash, &plan.deselected).await?;
        }
        self.select_files(hash, &plan.selected).await?;
        self.client.resume_torrent(hash).await
    }

    /// Poll until the daemon knows the torrent's file list.
    async fn wait_for_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        let deadline = tokio::time::Instant::now() + self.metadata_wait;

        loop {
            match self.client.get_files(hash).await {
                Ok(files) if !files.is_empty() => return Ok(files),
                Ok(_) | Err(TorrentClientError::TorrentNotFound(_)) => {}
                Err(e) => return Err(e),
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(hash = %hash, "Timed out waiting for torrent metadata");
                return Err(TorrentClientError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn require_absolute(destination: &str) -> Result<(), TorrentClientError> {
    if destination.is_empty() || !Path::new(destination).is_absolute() {
        return Err(TorrentClientError::InvalidDestination(format!(
            "destination must be an absolute path: {:?}",
            destination
        )));
    }
    Ok(())
}

fn magnet_hash(magnet: &str) -> Result<String, TorrentClientError> {
    extract_hash_from_magnet(magnet)
        .ok_or_else(|| TorrentClientError::InvalidMagnet(magnet.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{magnet_for, torrent_file, torrent_info};
    use crate::testing::MockTorrentClient;
    use crate::torrent_client::{FilenameEpisodeParser, TorrentState};

    fn gateway(client: Arc<MockTorrentClient>) -> DownloadClientGateway {
        DownloadClientGateway::new(client, Arc::new(FilenameEpisodeParser::new()))
            .with_metadata_wait(Duration::from_millis(200), Duration::from_millis(10))
    }

    fn episode_files() -> Vec<TorrentFile> {
        vec![
            torrent_file(0, "Show/Show - 01.mkv", 1_000),
            torrent_file(1, "Show/Show - 02.mkv", 1_000),
            torrent_file(2, "Show/Show - 03.mkv", 1_000),
            torrent_file(3, "Show/Extras/NCOP.mkv", 100),
        ]
    }

    #[tokio::test]
    async fn test_list_active_restarts_daemon_once() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_running(false).await;
        client.add_torrent_info(torrent_info("aaa", "/library/Show")).await;
        let gateway = gateway(client.clone());

        let torrents = gateway.list_active().await.unwrap();

        assert_eq!(torrents.len(), 1);
        assert_eq!(client.start_calls().await, 1);
    }

    #[tokio::test]
    async fn test_list_active_unavailable_when_start_fails() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_running(false).await;
        client.set_start_succeeds(false).await;
        let gateway = gateway(client.clone());

        let err = gateway.list_active().await.unwrap_err();

        assert!(matches!(err, TorrentClientError::ClientUnavailable(_)));
        assert_eq!(client.start_calls().await, 1);
    }

    #[tokio::test]
    async fn test_ensure_running_starts_only_when_down() {
        let client = Arc::new(MockTorrentClient::new());
        let gateway = gateway(client.clone());

        assert!(gateway.ensure_running().await);
        assert_eq!(client.start_calls().await, 0);

        client.set_running(false).await;
        assert!(gateway.ensure_running().await);
        assert_eq!(client.start_calls().await, 1);

        client.set_running(false).await;
        client.set_start_succeeds(false).await;
        assert!(!gateway.ensure_running().await);
    }

    #[tokio::test]
    async fn test_select_and_deselect_toggle_files() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        client.add_torrent_info(torrent_info("aaa", "/library/Show")).await;
        let gateway = gateway(client.clone());

        gateway.deselect_files("aaa", &[1, 2, 3]).await.unwrap();
        gateway.select_files("aaa", &[2]).await.unwrap();

        let wanted: Vec<bool> = gateway
            .get_files("aaa")
            .await
            .unwrap()
            .iter()
            .map(|f| f.wanted)
            .collect();
        assert_eq!(wanted, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn test_pause_and_resume_batch() {
        let client = Arc::new(MockTorrentClient::new());
        for hash in ["aaa", "bbb"] {
            client.add_torrent_info(torrent_info(hash, "/library/Show")).await;
        }
        let gateway = gateway(client.clone());
        let hashes = vec!["aaa".to_string(), "bbb".to_string()];

        gateway.pause(&hashes).await.unwrap();
        assert_eq!(client.torrent_state("bbb").await, Some(TorrentState::Paused));

        gateway.resume(&hashes).await.unwrap();
        assert_eq!(
            client.torrent_state("aaa").await,
            Some(TorrentState::Downloading)
        );

        gateway
            .apply_action(TorrentAction::Remove, &hashes[..1])
            .await
            .unwrap();
        assert_eq!(client.removed_hashes().await, vec!["aaa"]);
        assert!(client.is_tracked("bbb").await);
    }

    #[tokio::test]
    async fn test_add_magnets_rejects_relative_destination() {
        let client = Arc::new(MockTorrentClient::new());
        let gateway = gateway(client.clone());

        let err = gateway
            .add_magnets(vec![magnet_for("aaa")], "library/Show")
            .await
            .unwrap_err();

        assert!(matches!(err, TorrentClientError::InvalidDestination(_)));
        assert!(client.added_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_peek_untracked_torrent_leaves_no_residue() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        let gateway = gateway(client.clone());

        let files = gateway.peek_files(&magnet_for("aaa")).await.unwrap();

        assert_eq!(files.len(), 4);
        assert!(!client.is_tracked("aaa").await);
        assert_eq!(client.removed_hashes().await, vec!["aaa".to_string()]);

        let added = client.added_requests().await;
        assert!(added[0].paused);
        // The scratch directory is gone once the peek returns.
        assert!(!Path::new(&added[0].destination).exists());
    }

    #[tokio::test]
    async fn test_peek_tracked_torrent_is_not_removed() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        client.add_torrent_info(torrent_info("aaa", "/library/Show")).await;
        let gateway = gateway(client.clone());

        let files = gateway.peek_files(&magnet_for("aaa")).await.unwrap();

        assert_eq!(files.len(), 4);
        assert!(client.removed_hashes().await.is_empty());
        assert!(client.added_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_peek_returns_files_when_cleanup_fails() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        client.fail_hash("aaa").await;
        let gateway = gateway(client.clone());

        let files = gateway.peek_files(&magnet_for("aaa")).await.unwrap();

        assert_eq!(files.len(), 4);
    }

    #[tokio::test]
    async fn test_batch_partial_failure_names_failed_hashes() {
        let client = Arc::new(MockTorrentClient::new());
        for hash in ["aaa", "bbb", "ccc"] {
            client.add_torrent_info(torrent_info(hash, "/library/Show")).await;
        }
        client.fail_hash("bbb").await;
        let gateway = gateway(client.clone());

        let hashes = vec!["aaa".to_string(), "bbb".to_string(), "ccc".to_string()];
        let err = gateway.pause(&hashes).await.unwrap_err();

        match &err {
            TorrentClientError::PartialBatchFailure { failed, total } => {
                assert_eq!(*total, 3);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].hash, "bbb");
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert_eq!(
            client.torrent_state("aaa").await,
            Some(TorrentState::Paused)
        );
    }

    #[tokio::test]
    async fn test_batch_total_failure_is_distinct() {
        let client = Arc::new(MockTorrentClient::new());
        let gateway = gateway(client.clone());

        let hashes = vec!["missing1".to_string(), "missing2".to_string()];
        let err = gateway.resume(&hashes).await.unwrap_err();

        assert!(matches!(err, TorrentClientError::TotalBatchFailure { ref failed } if failed.len() == 2));
    }

    #[tokio::test]
    async fn test_smart_select_selects_requested_episodes() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        let gateway = gateway(client.clone());

        let plan = gateway
            .smart_select(SmartSelectRequest {
                magnet: magnet_for("aaa"),
                episode_numbers: vec![1, 2],
                destination: "/library/Show".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(plan.selected, vec![0, 1]);
        assert_eq!(plan.deselected, vec![2, 3]);

        let files = client.files("aaa").await;
        let wanted: Vec<usize> = files.iter().filter(|f| f.wanted).map(|f| f.index).collect();
        assert_eq!(wanted, vec![0, 1]);
        assert_eq!(
            client.torrent_state("aaa").await,
            Some(TorrentState::Downloading)
        );
    }

    #[tokio::test]
    async fn test_smart_select_without_match_removes_torrent() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        let gateway = gateway(client.clone());

        let err = gateway
            .smart_select(SmartSelectRequest {
                magnet: magnet_for("aaa"),
                episode_numbers: vec![12],
                destination: "/library/Show".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TorrentClientError::NoMatchingFiles(_)));
        assert!(!client.is_tracked("aaa").await);
    }

    #[tokio::test]
    async fn test_smart_select_without_match_keeps_tracked_torrent() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        client.add_torrent_info(torrent_info("aaa", "/library/Show")).await;
        let gateway = gateway(client.clone());

        let err = gateway
            .smart_select(SmartSelectRequest {
                magnet: magnet_for("aaa"),
                episode_numbers: vec![12],
                destination: "/library/Show".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TorrentClientError::NoMatchingFiles(_)));
        assert!(client.is_tracked("aaa").await);
        assert!(client.removed_hashes().await.is_empty());
        assert!(client.files("aaa").await.iter().all(|f| f.wanted));
    }

    #[tokio::test]
    async fn test_smart_select_on_tracked_torrent_only_adds_wanted_files() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        client.add_torrent_info(torrent_info("aaa", "/library/Show")).await;
        client.set_file_priority("aaa", &[0, 1, 2, 3], false).await.unwrap();
        let gateway = gateway(client.clone());

        let plan = gateway
            .smart_select(SmartSelectRequest {
                magnet: magnet_for("aaa"),
                episode_numbers: vec![2],
                destination: "/library/Show".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(plan.selected, vec![1]);
        assert!(client.added_requests().await.is_empty());
        let wanted: Vec<bool> = client.files("aaa").await.iter().map(|f| f.wanted).collect();
        assert_eq!(wanted, vec![false, true, false, false]);
    }

    #[tokio::test]
    async fn test_deselect_on_tracked_torrent_skips_nothing() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        client.add_torrent_info(torrent_info("aaa", "/library/Show")).await;
        let gateway = gateway(client.clone());

        gateway
            .deselect_and_download(DeselectRequest {
                magnet: magnet_for("aaa"),
                excluded_indices: vec![3],
                destination: "/library/Show".to_string(),
            })
            .await
            .unwrap();

        assert!(client.files("aaa").await.iter().all(|f| f.wanted));
        assert_eq!(
            client.torrent_state("aaa").await,
            Some(TorrentState::Downloading)
        );
    }

    #[tokio::test]
    async fn test_smart_select_times_out_without_metadata() {
        let client = Arc::new(MockTorrentClient::new());
        let gateway = gateway(client.clone());

        let err = gateway
            .smart_select(SmartSelectRequest {
                magnet: magnet_for("aaa"),
                episode_numbers: vec![1],
                destination: "/library/Show".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TorrentClientError::Timeout));
    }

    #[tokio::test]
    async fn test_deselect_and_download() {
        let client = Arc::new(MockTorrentClient::new());
        client.set_catalog_files("aaa", episode_files()).await;
        let gateway = gateway(client.clone());

        let plan = gateway
            .deselect_and_download(DeselectRequest {
                magnet: magnet_for("aaa"),
                excluded_indices: vec![3],
                destination: "/library/Show".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(plan.selected, vec![0, 1, 2]);
        let files = client.files("aaa").await;
        assert!(!files[3].wanted);
        assert!(files[0].wanted);
    }
}
