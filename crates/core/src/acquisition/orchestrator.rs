//! Acquisition orchestrator.
//!
//! One download request runs through:
//! validate → daemon check → metadata → {smart select | deselect | plain add}
//! → pre-match record → (spawned) collection sync.
//!
//! Only the steps up to handing torrents to the daemon can fail the request.
//! Pre-match persistence and collection sync are best-effort.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::platform::{CompleteAnime, MediaId, Platform, PlatformResolver};
use crate::prematch::PreMatchStore;
use crate::torrent_client::{
    DeselectRequest, DownloadClientGateway, SmartSelectRequest, TorrentFile,
};

use super::events::{EventSink, REFRESHED_ANIME_COLLECTION, TORRENT_PREMATCHES_CLEARED};
use super::{
    AcquisitionError, AcquisitionMode, DownloadOutcome, DownloadRequest, MetadataSource,
    ProviderRegistry, ProviderTorrent,
};

/// Coordinates downloads on behalf of sessions.
pub struct AcquisitionService {
    gateway: Arc<DownloadClientGateway>,
    resolver: Arc<PlatformResolver>,
    providers: Arc<ProviderRegistry>,
    prematch: Arc<dyn PreMatchStore>,
    events: Arc<dyn EventSink>,
}

impl AcquisitionService {
    pub fn new(
        gateway: Arc<DownloadClientGateway>,
        resolver: Arc<PlatformResolver>,
        providers: Arc<ProviderRegistry>,
        prematch: Arc<dyn PreMatchStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            gateway,
            resolver,
            providers,
            prematch,
            events,
        }
    }

    pub fn gateway(&self) -> &Arc<DownloadClientGateway> {
        &self.gateway
    }

    /// Download torrents to a destination for a catalog entry.
    pub async fn download(
        &self,
        request: DownloadRequest,
    ) -> Result<DownloadOutcome, AcquisitionError> {
        let mode = request.mode();
        let timer = metrics::ACQUISITION_DURATION
            .with_label_values(&[mode.as_str()])
            .start_timer();

        let result = self.run_download(&request, mode).await;

        timer.observe_duration();
        let label = if result.is_ok() { "success" } else { "failure" };
        metrics::ACQUISITIONS
            .with_label_values(&[mode.as_str(), label])
            .inc();

        if let Err(e) = &result {
            warn!(
                session_id = %request.session_id,
                mode = mode.as_str(),
                destination = %request.destination,
                error = %e,
                "Download request failed"
            );
        }
        result
    }

    async fn run_download(
        &self,
        request: &DownloadRequest,
        mode: AcquisitionMode,
    ) -> Result<DownloadOutcome, AcquisitionError> {
        validate_request(request)?;

        if !self.gateway.ensure_running().await {
            return Err(AcquisitionError::ClientUnavailable(
                "could not contact the download client, verify the settings or make sure it is running"
                    .to_string(),
            ));
        }

        let platform = self.resolver.platform_for(&request.session_id);
        let resolved = self.resolve_media(platform.as_ref(), request).await;
        let (media, metadata_source) = match resolved {
            Some((anime, source)) => {
                debug!(
                    media_id = anime.id(),
                    title = %anime.anime.title,
                    source = ?source,
                    "Resolved media metadata"
                );
                (Some(anime), Some(source))
            }
            None => (None, None),
        };

        let destination = request.destination.as_str();
        let mut skipped_episodes = Vec::new();
        let (magnets, selection) = match mode {
            AcquisitionMode::SmartSelect => {
                let (episode_numbers, skipped) =
                    split_by_episode_count(&request.smart_select.episode_numbers, media.as_ref());
                if episode_numbers.is_empty() {
                    return Err(AcquisitionError::InvalidRequest(format!(
                        "requested episodes {:?} are past the entry's episode count",
                        skipped
                    )));
                }
                if !skipped.is_empty() {
                    warn!(episodes = ?skipped, "Skipping episodes past the entry's episode count");
                }
                skipped_episodes = skipped;

                let magnet = self.providers.resolve(&request.torrents[0]).await?;
                let plan = self
                    .gateway
                    .smart_select(SmartSelectRequest {
                        magnet: magnet.clone(),
                        episode_numbers,
                        destination: destination.to_string(),
                    })
                    .await?;
                (vec![magnet], Some(plan))
            }
            AcquisitionMode::Deselect => {
                let magnet = self.providers.resolve(&request.torrents[0]).await?;
                let plan = self
                    .gateway
                    .deselect_and_download(DeselectRequest {
                        magnet: magnet.clone(),
                        excluded_indices: request.deselect.indices.clone(),
                        destination: destination.to_string(),
                    })
                    .await?;
                (vec![magnet], Some(plan))
            }
            AcquisitionMode::Plain => {
                let magnets = self.resolve_magnets(&request.torrents).await?;
                self.gateway.add_magnets(magnets.clone(), destination).await?;
                (magnets, None)
            }
        };

        let media_id = request.media_id();
        let pre_match_saved = match media_id {
            Some(id) => self.record_pre_match(destination, id),
            None => false,
        };

        if let Some(id) = media_id {
            self.spawn_collection_sync(platform, id);
        }

        info!(
            session_id = %request.session_id,
            mode = mode.as_str(),
            torrents = magnets.len(),
            destination,
            media_id = ?media_id,
            "Download started"
        );

        Ok(DownloadOutcome {
            mode,
            magnets,
            selection,
            media_id,
            media,
            metadata_source,
            skipped_episodes,
            pre_match_saved,
        })
    }

    /// Full metadata from the platform, or the caller's partial metadata
    /// when the lookup fails.
    async fn resolve_media(
        &self,
        platform: &dyn Platform,
        request: &DownloadRequest,
    ) -> Option<(CompleteAnime, MetadataSource)> {
        let media = request.media.as_ref()?;
        match platform.get_anime_with_relations(media.id).await {
            Ok(anime) => Some((anime, MetadataSource::Platform)),
            Err(e) => {
                debug!(media_id = media.id, error = %e, "Metadata lookup failed, using request metadata");
                Some((media.to_complete_anime(), MetadataSource::Request))
            }
        }
    }

    /// One provider call per torrent. The first failure aborts the batch.
    async fn resolve_magnets(
        &self,
        torrents: &[ProviderTorrent],
    ) -> Result<Vec<String>, AcquisitionError> {
        let mut magnets = Vec::with_capacity(torrents.len());
        for torrent in torrents {
            magnets.push(self.providers.resolve(torrent).await?);
        }
        Ok(magnets)
    }

    fn record_pre_match(&self, destination: &str, media_id: MediaId) -> bool {
        match self.prematch.save(destination, media_id) {
            Ok(entry) => {
                metrics::PREMATCH_SAVES.with_label_values(&["success"]).inc();
                info!(
                    media_id,
                    destination = %entry.destination,
                    "Saved pre-match for file matching"
                );
                true
            }
            Err(e) => {
                metrics::PREMATCH_SAVES.with_label_values(&["failure"]).inc();
                warn!(media_id, destination, error = %e, "Failed to save pre-match");
                false
            }
        }
    }

    /// Run the collection sync in the background.
    ///
    /// The work runs in its own task so a panic inside it is caught by the
    /// runtime and only logged here.
    fn spawn_collection_sync(&self, platform: Arc<dyn Platform>, media_id: MediaId) {
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            let work: JoinHandle<()> = tokio::spawn(sync_collection(platform, events, media_id));
            if let Err(e) = work.await {
                error!(media_id, error = %e, "Collection sync task failed");
            }
        });
    }

    /// Add a catalog entry to the session's collection if it is not tracked yet.
    pub async fn sync_collection(&self, session_id: &str, media_id: MediaId) {
        let platform = self.resolver.platform_for(session_id);
        sync_collection(platform, Arc::clone(&self.events), media_id).await;
    }

    /// List a torrent's files without downloading it.
    pub async fn peek_files(
        &self,
        torrent: &ProviderTorrent,
    ) -> Result<Vec<TorrentFile>, AcquisitionError> {
        if torrent.info_hash.is_empty() && torrent.magnet_link.is_none() {
            return Err(AcquisitionError::InvalidRequest(
                "torrent has no info hash".to_string(),
            ));
        }
        if !self.gateway.ensure_running().await {
            return Err(AcquisitionError::ClientUnavailable(
                "could not contact the download client".to_string(),
            ));
        }

        let magnet = self.providers.resolve(torrent).await?;
        Ok(self.gateway.peek_files(&magnet).await?)
    }

    /// Empty the pre-match table and notify subscribers.
    pub fn clear_pre_matches(&self) -> Result<usize, AcquisitionError> {
        let removed = self.prematch.clear_all()?;
        info!(removed, "Cleared all pre-matches");
        self.events
            .publish(TORRENT_PREMATCHES_CLEARED, json!({ "removed": removed }));
        Ok(removed)
    }
}

async fn sync_collection(platform: Arc<dyn Platform>, events: Arc<dyn EventSink>, media_id: MediaId) {
    let collection = match platform.get_anime_collection(false).await {
        Ok(collection) => collection,
        Err(e) => {
            warn!(media_id, error = %e, "Could not fetch collection, skipping sync");
            return;
        }
    };
    if collection.contains(media_id) {
        debug!(media_id, "Media already in collection");
        return;
    }

    if let Err(e) = platform.add_media_to_collection(&[media_id]).await {
        warn!(media_id, error = %e, "Failed to add media to collection");
    }

    match platform.refresh_anime_collection().await {
        Ok(refreshed) => {
            info!(media_id, "Added media to collection");
            match serde_json::to_value(&refreshed) {
                Ok(payload) => events.publish(REFRESHED_ANIME_COLLECTION, payload),
                Err(e) => warn!(error = %e, "Could not serialize refreshed collection"),
            }
        }
        Err(e) => warn!(media_id, error = %e, "Failed to refresh collection"),
    }
}

/// Checks that run before any daemon state changes.
fn validate_request(request: &DownloadRequest) -> Result<(), AcquisitionError> {
    let destination = request.destination.as_str();
    if destination.is_empty() {
        return Err(AcquisitionError::InvalidDestination(
            "destination is required".to_string(),
        ));
    }
    if !Path::new(destination).is_absolute() {
        return Err(AcquisitionError::InvalidDestination(format!(
            "destination path must be absolute: {:?}",
            destination
        )));
    }

    if request.torrents.is_empty() {
        return Err(AcquisitionError::InvalidRequest(
            "no torrents to download".to_string(),
        ));
    }

    if request.smart_select.enabled && request.deselect.enabled {
        return Err(AcquisitionError::InvalidRequest(
            "smart select and deselect cannot be combined".to_string(),
        ));
    }

    if request.smart_select.enabled {
        if request.torrents.len() > 1 {
            return Err(AcquisitionError::InvalidRequest(
                "smart select is not supported for multiple torrents".to_string(),
            ));
        }
        if request.smart_select.episode_numbers.is_empty() {
            return Err(AcquisitionError::InvalidRequest(
                "smart select needs at least one episode number".to_string(),
            ));
        }
    }

    if request.deselect.enabled && request.torrents.len() > 1 {
        return Err(AcquisitionError::InvalidRequest(
            "deselect is not supported for multiple torrents".to_string(),
        ));
    }

    Ok(())
}

/// Split requested episodes into those within the entry's known episode
/// count and those past it. An unknown or zero count keeps everything.
fn split_by_episode_count(
    requested: &[u32],
    media: Option<&CompleteAnime>,
) -> (Vec<u32>, Vec<u32>) {
    match media.and_then(|m| m.anime.episodes).filter(|count| *count > 0) {
        Some(count) => requested.iter().copied().partition(|ep| *ep <= count),
        None => (requested.to_vec(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{DeselectOptions, SmartSelectOptions};
    use crate::testing::fixtures::{base_anime, provider_torrent};

    fn request(torrents: Vec<ProviderTorrent>, destination: &str) -> DownloadRequest {
        DownloadRequest {
            torrents,
            destination: destination.to_string(),
            media: Some(base_anime(42, "Show", Some(12))),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_by_episode_count() {
        let media = base_anime(42, "Show", Some(12)).to_complete_anime();
        assert_eq!(
            split_by_episode_count(&[3, 12, 13, 25], Some(&media)),
            (vec![3, 12], vec![13, 25])
        );

        let airing = base_anime(42, "Show", None).to_complete_anime();
        assert_eq!(
            split_by_episode_count(&[13], Some(&airing)),
            (vec![13], vec![])
        );
        assert_eq!(split_by_episode_count(&[13], None), (vec![13], vec![]));
    }

    #[test]
    fn test_relative_destination_is_rejected() {
        let req = request(vec![provider_torrent("direct", "aaa")], "library/Show");
        assert!(matches!(
            validate_request(&req),
            Err(AcquisitionError::InvalidDestination(_))
        ));

        let req = request(vec![provider_torrent("direct", "aaa")], "");
        assert!(matches!(
            validate_request(&req),
            Err(AcquisitionError::InvalidDestination(_))
        ));
    }

    #[test]
    fn test_smart_select_requires_single_torrent() {
        let mut req = request(
            vec![provider_torrent("direct", "aaa"), provider_torrent("direct", "bbb")],
            "/library/Show",
        );
        req.smart_select = SmartSelectOptions {
            enabled: true,
            episode_numbers: vec![1],
        };

        assert!(matches!(
            validate_request(&req),
            Err(AcquisitionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_smart_select_requires_episodes() {
        let mut req = request(vec![provider_torrent("direct", "aaa")], "/library/Show");
        req.smart_select.enabled = true;

        assert!(matches!(
            validate_request(&req),
            Err(AcquisitionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_deselect_requires_single_torrent_and_excludes_smart_select() {
        let mut req = request(
            vec![provider_torrent("direct", "aaa"), provider_torrent("direct", "bbb")],
            "/library/Show",
        );
        req.deselect = DeselectOptions {
            enabled: true,
            indices: vec![0],
        };
        assert!(validate_request(&req).is_err());

        req.torrents.truncate(1);
        assert!(validate_request(&req).is_ok());

        req.smart_select = SmartSelectOptions {
            enabled: true,
            episode_numbers: vec![1],
        };
        assert!(matches!(
            validate_request(&req),
            Err(AcquisitionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_empty_torrent_list_is_rejected() {
        let req = request(Vec::new(), "/library/Show");
        assert!(matches!(
            validate_request(&req),
            Err(AcquisitionError::InvalidRequest(_))
        ));
    }
}
