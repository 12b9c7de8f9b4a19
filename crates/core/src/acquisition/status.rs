//! Per-media download status for polling clients.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::platform::MediaId;
use crate::prematch::{longest_prefix_match, normalize_path, PreMatchStore};
use crate::torrent_client::DownloadClientGateway;

use super::MediaDownloadStatus;

/// Joins the daemon's torrent list with the pre-match table.
pub struct StatusAggregator {
    gateway: Arc<DownloadClientGateway>,
    prematch: Arc<dyn PreMatchStore>,
}

impl StatusAggregator {
    pub fn new(gateway: Arc<DownloadClientGateway>, prematch: Arc<dyn PreMatchStore>) -> Self {
        Self { gateway, prematch }
    }

    /// Download status of every catalog entry with an active torrent.
    ///
    /// Never fails: a daemon that stays unreachable after one restart attempt,
    /// or an unreadable store, yields an empty list.
    /// Each torrent is attributed to the most specific pre-match destination
    /// containing its content path. A catalog id appears once, for the first
    /// matching torrent in daemon order.
    pub async fn media_download_status(&self) -> Vec<MediaDownloadStatus> {
        let torrents = match self.gateway.list_active().await {
            Ok(torrents) => torrents,
            Err(e) => {
                debug!(error = %e, "Download client unavailable, reporting no downloads");
                return Vec::new();
            }
        };

        let pre_matches = match self.prematch.get_all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not load pre-matches");
                return Vec::new();
            }
        };
        if pre_matches.is_empty() {
            return Vec::new();
        }

        let index: Vec<(String, MediaId)> = pre_matches
            .into_iter()
            .map(|pm| (normalize_path(&pm.destination), pm.media_id))
            .collect();

        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for torrent in torrents {
            let content_path = normalize_path(&torrent.content_path);
            let matched = longest_prefix_match(
                &content_path,
                index.iter().map(|(dest, id)| (dest.as_str(), *id)),
            );

            if let Some(media_id) = matched {
                if seen.insert(media_id) {
                    result.push(MediaDownloadStatus {
                        media_id,
                        status: torrent.state,
                        progress: torrent.progress,
                    });
                }
            }
        }

        result
    }
}
