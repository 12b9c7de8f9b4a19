//! Prometheus metrics for the running service.
//!
//! Registers the core metrics alongside gauges that are sampled from the
//! application state rather than updated inline.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Sessions logged in with a real token.
pub static SESSIONS_AUTHENTICATED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tsundoku_sessions_authenticated",
        "Sessions currently logged in to the platform",
    )
    .unwrap()
});

/// Catalog entries with an active torrent.
pub static MEDIA_DOWNLOADING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tsundoku_media_downloading",
        "Catalog entries with at least one active torrent",
    )
    .unwrap()
});

/// Rows in the pre-match table.
pub static PREMATCH_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("tsundoku_prematch_entries", "Entries in the pre-match table").unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(SESSIONS_AUTHENTICATED.clone()))
        .unwrap();
    registry
        .register(Box::new(MEDIA_DOWNLOADING.clone()))
        .unwrap();
    registry
        .register(Box::new(PREMATCH_ENTRIES.clone()))
        .unwrap();

    for metric in tsundoku_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Snapshot of the sampled gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub sessions: usize,
    pub authenticated: usize,
    pub media_downloading: usize,
    pub prematch_entries: usize,
}

/// Sample gauges from the current application state.
pub async fn collect_dynamic_metrics(state: &AppState) -> StatusSnapshot {
    let sessions = state.sessions().len();
    let authenticated = state.sessions().list_authenticated().len();
    SESSIONS_AUTHENTICATED.set(authenticated as i64);

    let media_downloading = state.status().media_download_status().await.len();
    MEDIA_DOWNLOADING.set(media_downloading as i64);

    let prematch_entries = state.prematch().get_all().map(|e| e.len()).unwrap_or(0);
    PREMATCH_ENTRIES.set(prematch_entries as i64);

    StatusSnapshot {
        sessions,
        authenticated,
        media_downloading,
        prematch_entries,
    }
}
