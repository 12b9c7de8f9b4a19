//! Acquisition lifecycle integration tests.
//!
//! These tests drive download requests end-to-end over the mock daemon, the
//! mock platform and a temp-file SQLite pre-match table:
//! validate -> daemon check -> add/select -> pre-match -> collection sync -> status

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tsundoku_core::{
    acquisition::{
        DeselectOptions, MetadataSource, SmartSelectOptions, REFRESHED_ANIME_COLLECTION,
        TORRENT_PREMATCHES_CLEARED,
    },
    platform::{AnimeCollection, AnimeListEntry, MediaListStatus},
    prematch::PreMatch,
    testing::{
        fixtures, MockMagnetProvider, MockPlatformBackend, MockTorrentClient, RecordingEventSink,
    },
    AcquisitionError, AcquisitionService, ClientPlatform, DefaultPlatform, DownloadClientGateway,
    DownloadRequest, FilenameEpisodeParser, MediaId, PlatformResolver, PreMatchError,
    PreMatchStore, ProviderRegistry, ProviderTorrent, SessionRegistry, SqlitePreMatchStore,
    StatusAggregator, TorrentState,
};

const PROVIDER: &str = "mock";

/// Test helper wiring every collaborator of the acquisition service.
struct TestHarness {
    torrent_client: Arc<MockTorrentClient>,
    backend: Arc<MockPlatformBackend>,
    registry: Arc<SessionRegistry>,
    provider: MockMagnetProvider,
    events: RecordingEventSink,
    store: Arc<SqlitePreMatchStore>,
    service: AcquisitionService,
    status: StatusAggregator,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqlitePreMatchStore::new(&temp_dir.path().join("test.db"))
                .expect("Failed to create pre-match store"),
        );
        Self::with_store(store.clone(), store, temp_dir)
    }

    fn with_store(
        store: Arc<SqlitePreMatchStore>,
        prematch: Arc<dyn PreMatchStore>,
        temp_dir: TempDir,
    ) -> Self {
        let torrent_client = Arc::new(MockTorrentClient::new());
        let backend = Arc::new(MockPlatformBackend::new());
        let registry = Arc::new(SessionRegistry::new(
            backend.factory(),
            chrono::Duration::days(7),
        ));
        let default = Arc::new(DefaultPlatform::new(Arc::new(ClientPlatform::new(
            backend.client(""),
        ))));
        let resolver = Arc::new(PlatformResolver::new(registry.clone(), default));

        let gateway = Arc::new(
            DownloadClientGateway::new(
                torrent_client.clone(),
                Arc::new(FilenameEpisodeParser::new()),
            )
            .with_metadata_wait(Duration::from_millis(500), Duration::from_millis(10)),
        );

        let provider = MockMagnetProvider::new(PROVIDER);
        let providers = Arc::new(ProviderRegistry::new().with_provider(Arc::new(provider.clone())));
        let events = RecordingEventSink::new();

        let service = AcquisitionService::new(
            gateway.clone(),
            resolver,
            providers,
            prematch.clone(),
            Arc::new(events.clone()),
        );
        let status = StatusAggregator::new(gateway, prematch);

        Self {
            torrent_client,
            backend,
            registry,
            provider,
            events,
            store,
            service,
            status,
            _temp_dir: temp_dir,
        }
    }

    fn request(&self, hashes: &[&str], destination: &str) -> DownloadRequest {
        DownloadRequest {
            torrents: hashes
                .iter()
                .map(|h| fixtures::provider_torrent(PROVIDER, h))
                .collect(),
            destination: destination.to_string(),
            media: Some(fixtures::base_anime(42, "Show", Some(12))),
            ..Default::default()
        }
    }

    async fn set_episode_files(&self, hash: &str) {
        self.torrent_client
            .set_catalog_files(
                hash,
                vec![
                    fixtures::torrent_file(0, "Show/[Group] Show - 01 [1080p].mkv", 1_000),
                    fixtures::torrent_file(1, "Show/[Group] Show - 02 [1080p].mkv", 1_000),
                    fixtures::torrent_file(2, "Show/[Group] Show - 03 [1080p].mkv", 1_000),
                    fixtures::torrent_file(3, "Show/Extras/NCOP.mkv", 100),
                ],
            )
            .await;
    }

    async fn wait_for_event(&self, name: &str) -> bool {
        for _ in 0..200 {
            if self.events.names().iter().any(|n| n == name) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn wait_for_collection_fetch(&self) -> bool {
        for _ in 0..200 {
            if !self.backend.collection_fetches().await.is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Pre-match store whose writes always fail.
struct FailingPreMatchStore;

impl PreMatchStore for FailingPreMatchStore {
    fn save(&self, _: &str, _: MediaId) -> Result<PreMatch, PreMatchError> {
        Err(PreMatchError::Database("disk full".to_string()))
    }
    fn get(&self, id: i64) -> Result<PreMatch, PreMatchError> {
        Err(PreMatchError::NotFound(id.to_string()))
    }
    fn get_by_destination(&self, _: &str) -> Result<Option<PreMatch>, PreMatchError> {
        Ok(None)
    }
    fn get_for_path(&self, _: &str) -> Result<Option<MediaId>, PreMatchError> {
        Ok(None)
    }
    fn get_all(&self) -> Result<Vec<PreMatch>, PreMatchError> {
        Ok(Vec::new())
    }
    fn delete_by_id(&self, id: i64) -> Result<(), PreMatchError> {
        Err(PreMatchError::NotFound(id.to_string()))
    }
    fn delete_by_destination(&self, _: &str) -> Result<bool, PreMatchError> {
        Ok(false)
    }
    fn delete_older_than(&self, _: u32) -> Result<usize, PreMatchError> {
        Ok(0)
    }
    fn clear_all(&self) -> Result<usize, PreMatchError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_plain_download_records_pre_match_and_reports_status() {
    let h = TestHarness::new();

    let outcome = h
        .service
        .download(h.request(&["aaa", "bbb"], "/library/Show"))
        .await
        .unwrap();

    assert_eq!(outcome.magnets.len(), 2);
    assert!(outcome.selection.is_none());
    assert!(outcome.pre_match_saved);
    assert_eq!(outcome.media_id, Some(42));

    // One call to the daemon with every magnet
    let added = h.torrent_client.added_requests().await;
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].uris.len(), 2);
    assert_eq!(added[0].destination, "/library/Show");
    assert!(!added[0].paused);

    // The scanner can attribute files under the destination
    assert_eq!(
        h.store.get_for_path("/library/Show/Season 1/ep01.mkv").unwrap(),
        Some(42)
    );
    assert_eq!(h.store.get_for_path("/library/Other/ep01.mkv").unwrap(), None);

    // Both torrents land in the destination, the media is reported once
    let status = h.status.media_download_status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].media_id, 42);
    assert_eq!(status[0].status, TorrentState::Downloading);
}

#[tokio::test]
async fn test_smart_select_downloads_requested_episodes_only() {
    let h = TestHarness::new();
    h.set_episode_files("aaa").await;

    let mut request = h.request(&["aaa"], "/library/Show");
    request.smart_select = SmartSelectOptions {
        enabled: true,
        episode_numbers: vec![1, 2],
    };

    let outcome = h.service.download(request).await.unwrap();

    let plan = outcome.selection.unwrap();
    assert_eq!(plan.selected, vec![0, 1]);
    assert_eq!(plan.deselected, vec![2, 3]);

    let wanted: Vec<bool> = h
        .torrent_client
        .files("aaa")
        .await
        .iter()
        .map(|f| f.wanted)
        .collect();
    assert_eq!(wanted, vec![true, true, false, false]);

    // Added paused, started once the selection was applied
    assert!(h.torrent_client.added_requests().await[0].paused);
    assert_eq!(
        h.torrent_client.torrent_state("aaa").await,
        Some(TorrentState::Downloading)
    );
}

#[tokio::test]
async fn test_smart_select_without_matches_cleans_up() {
    let h = TestHarness::new();
    h.set_episode_files("aaa").await;

    let mut request = h.request(&["aaa"], "/library/Show");
    request.smart_select = SmartSelectOptions {
        enabled: true,
        episode_numbers: vec![7],
    };

    let err = h.service.download(request).await.unwrap_err();

    assert!(matches!(err, AcquisitionError::TorrentClient(_)));
    assert!(!h.torrent_client.is_tracked("aaa").await);
    assert!(h.store.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_deselect_skips_excluded_files() {
    let h = TestHarness::new();
    h.set_episode_files("aaa").await;

    let mut request = h.request(&["aaa"], "/library/Show");
    request.deselect = DeselectOptions {
        enabled: true,
        indices: vec![3],
    };

    let outcome = h.service.download(request).await.unwrap();

    assert_eq!(outcome.selection.unwrap().deselected, vec![3]);
    let files = h.torrent_client.files("aaa").await;
    assert!(files[0].wanted);
    assert!(!files[3].wanted);
    assert!(outcome.pre_match_saved);
}

#[tokio::test]
async fn test_smart_select_rejects_multiple_torrents_before_touching_daemon() {
    let h = TestHarness::new();
    h.torrent_client.set_running(false).await;

    let mut request = h.request(&["aaa", "bbb"], "/library/Show");
    request.smart_select = SmartSelectOptions {
        enabled: true,
        episode_numbers: vec![1],
    };

    let err = h.service.download(request).await.unwrap_err();

    assert!(matches!(err, AcquisitionError::InvalidRequest(_)));
    assert_eq!(h.torrent_client.start_calls().await, 0);
    assert!(h.torrent_client.added_requests().await.is_empty());
}

#[tokio::test]
async fn test_relative_destination_is_rejected() {
    let h = TestHarness::new();

    let err = h
        .service
        .download(h.request(&["aaa"], "library/Show"))
        .await
        .unwrap_err();

    assert!(matches!(err, AcquisitionError::InvalidDestination(_)));
    assert!(h.torrent_client.added_requests().await.is_empty());
    assert!(h.provider.resolved().await.is_empty());
}

#[tokio::test]
async fn test_unavailable_daemon_fails_without_pre_match() {
    let h = TestHarness::new();
    h.torrent_client.set_running(false).await;
    h.torrent_client.set_start_succeeds(false).await;

    let err = h
        .service
        .download(h.request(&["aaa"], "/library/Show"))
        .await
        .unwrap_err();

    assert!(matches!(err, AcquisitionError::ClientUnavailable(_)));
    assert_eq!(h.torrent_client.start_calls().await, 1);
    assert!(h.store.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_daemon_is_started_when_down() {
    let h = TestHarness::new();
    h.torrent_client.set_running(false).await;

    h.service
        .download(h.request(&["aaa"], "/library/Show"))
        .await
        .unwrap();

    assert_eq!(h.torrent_client.start_calls().await, 1);
    assert!(h.torrent_client.is_tracked("aaa").await);
}

#[tokio::test]
async fn test_provider_failure_aborts_whole_batch() {
    let h = TestHarness::new();
    h.provider.fail_hash("bbb", "magnet page gone").await;

    let err = h
        .service
        .download(h.request(&["aaa", "bbb", "ccc"], "/library/Show"))
        .await
        .unwrap_err();

    match err {
        AcquisitionError::Provider { provider, message } => {
            assert_eq!(provider, PROVIDER);
            assert_eq!(message, "magnet page gone");
        }
        other => panic!("unexpected error: {other}"),
    }
    // Resolution stops at the failing torrent, nothing reaches the daemon
    assert_eq!(h.provider.resolved().await, vec!["aaa", "bbb"]);
    assert!(h.torrent_client.added_requests().await.is_empty());
    assert!(h.store.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_provider_is_rejected() {
    let h = TestHarness::new();
    let mut request = h.request(&["aaa"], "/library/Show");
    request.torrents = vec![ProviderTorrent {
        provider: "elsewhere".to_string(),
        ..fixtures::provider_torrent(PROVIDER, "aaa")
    }];

    let err = h.service.download(request).await.unwrap_err();

    assert!(matches!(err, AcquisitionError::ProviderNotFound(name) if name == "elsewhere"));
}

#[tokio::test]
async fn test_pre_match_failure_does_not_fail_download() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqlitePreMatchStore::in_memory().unwrap());
    let h = TestHarness::with_store(store, Arc::new(FailingPreMatchStore), temp_dir);

    let outcome = h
        .service
        .download(h.request(&["aaa"], "/library/Show"))
        .await
        .unwrap();

    assert!(!outcome.pre_match_saved);
    assert!(h.torrent_client.is_tracked("aaa").await);
}

#[tokio::test]
async fn test_metadata_failure_falls_back_to_request_media() {
    let h = TestHarness::new();
    h.backend.set_fail_metadata(true).await;

    let outcome = h
        .service
        .download(h.request(&["aaa"], "/library/Show"))
        .await
        .unwrap();

    assert_eq!(outcome.media_id, Some(42));
    assert_eq!(outcome.metadata_source, Some(MetadataSource::Request));
    assert_eq!(outcome.media.unwrap().anime.title, "Show");
    assert!(outcome.pre_match_saved);
}

#[tokio::test]
async fn test_platform_metadata_bounds_smart_select_episodes() {
    let h = TestHarness::new();
    h.set_episode_files("aaa").await;
    // The platform knows the entry better than the caller does
    h.backend
        .set_anime(fixtures::complete_anime(42, "Show (Remote)", Some(2)))
        .await;

    let mut request = h.request(&["aaa"], "/library/Show");
    request.smart_select = SmartSelectOptions {
        enabled: true,
        episode_numbers: vec![1, 2, 3],
    };

    let outcome = h.service.download(request).await.unwrap();

    assert_eq!(outcome.metadata_source, Some(MetadataSource::Platform));
    assert_eq!(outcome.media.unwrap().anime.title, "Show (Remote)");
    assert_eq!(outcome.skipped_episodes, vec![3]);
    assert_eq!(outcome.selection.unwrap().selected, vec![0, 1]);
}

#[tokio::test]
async fn test_smart_select_past_episode_count_is_rejected() {
    let h = TestHarness::new();
    h.set_episode_files("aaa").await;
    h.backend
        .set_anime(fixtures::complete_anime(42, "Show", Some(2)))
        .await;

    let mut request = h.request(&["aaa"], "/library/Show");
    request.smart_select = SmartSelectOptions {
        enabled: true,
        episode_numbers: vec![5, 6],
    };

    let err = h.service.download(request).await.unwrap_err();

    assert!(matches!(err, AcquisitionError::InvalidRequest(_)));
    assert!(h.torrent_client.added_requests().await.is_empty());
    assert!(h.provider.resolved().await.is_empty());
    assert!(h.store.get_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_collection_sync_adds_media_for_session() {
    let h = TestHarness::new();
    h.backend
        .set_anime(fixtures::complete_anime(42, "Show", Some(12)))
        .await;
    h.registry.login("s1", "tok-1", fixtures::viewer("alice"));

    let mut request = h.request(&["aaa"], "/library/Show");
    request.session_id = "s1".to_string();
    h.service.download(request).await.unwrap();

    assert!(h.wait_for_event(REFRESHED_ANIME_COLLECTION).await);
    assert_eq!(h.backend.added_to_collection("tok-1").await, vec![42]);
    assert!(h.backend.added_to_collection("").await.is_empty());

    // The refresh bypassed the cache and its result was published
    let fetches = h.backend.collection_fetches().await;
    assert!(fetches.contains(&("tok-1".to_string(), true)));
    let (_, payload) = h.events.events().pop().unwrap();
    assert_eq!(payload["entries"][0]["media"]["id"], 42);
}

#[tokio::test]
async fn test_collection_sync_skips_tracked_media() {
    let h = TestHarness::new();
    h.registry.login("s1", "tok-1", fixtures::viewer("alice"));
    h.backend
        .set_collection(
            "tok-1",
            AnimeCollection {
                entries: vec![AnimeListEntry {
                    media: fixtures::base_anime(42, "Show", Some(12)),
                    status: Some(MediaListStatus::Current),
                    progress: 3,
                }],
            },
        )
        .await;

    let mut request = h.request(&["aaa"], "/library/Show");
    request.session_id = "s1".to_string();
    h.service.download(request).await.unwrap();

    assert!(h.wait_for_collection_fetch().await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.backend.added_to_collection("tok-1").await.is_empty());
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn test_collection_add_failure_is_swallowed() {
    let h = TestHarness::new();
    h.backend.set_fail_add(true).await;
    h.registry.login("s1", "tok-1", fixtures::viewer("alice"));

    let mut request = h.request(&["aaa"], "/library/Show");
    request.session_id = "s1".to_string();
    let outcome = h.service.download(request).await.unwrap();

    assert!(outcome.pre_match_saved);
    // The refresh still runs after a failed add
    assert!(h.wait_for_event(REFRESHED_ANIME_COLLECTION).await);
}

#[tokio::test]
async fn test_clear_pre_matches_notifies_subscribers() {
    let h = TestHarness::new();
    h.store.save("/library/Show", 42).unwrap();
    h.store.save("/library/Other", 7).unwrap();

    let removed = h.service.clear_pre_matches().unwrap();

    assert_eq!(removed, 2);
    assert!(h.store.get_all().unwrap().is_empty());
    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, TORRENT_PREMATCHES_CLEARED);
    assert_eq!(events[0].1["removed"], 2);
}

#[tokio::test]
async fn test_peek_files_leaves_no_torrent_behind() {
    let h = TestHarness::new();
    h.set_episode_files("aaa").await;

    let files = h
        .service
        .peek_files(&fixtures::provider_torrent(PROVIDER, "aaa"))
        .await
        .unwrap();

    assert_eq!(files.len(), 4);
    assert!(!h.torrent_client.is_tracked("aaa").await);
    assert!(h.status.media_download_status().await.is_empty());
}

#[tokio::test]
async fn test_status_survives_daemon_outage() {
    let h = TestHarness::new();
    h.service
        .download(h.request(&["aaa"], "/library/Show"))
        .await
        .unwrap();
    assert_eq!(h.status.media_download_status().await.len(), 1);

    h.torrent_client.set_running(false).await;
    h.torrent_client.set_start_succeeds(false).await;

    assert!(h.status.media_download_status().await.is_empty());
    assert_eq!(h.torrent_client.start_calls().await, 1);
}
