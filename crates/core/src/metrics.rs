//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Session registry (active sessions, evictions, logins)
//! - Acquisitions (requests by mode, duration, pre-match persistence)
//! - Download daemon supervision (restarts)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Sessions
// =============================================================================

/// Sessions currently held by the registry.
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tsundoku_sessions_active",
        "Sessions currently held in memory",
    )
    .unwrap()
});

/// Sessions removed by the idle sweep.
pub static SESSIONS_EVICTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tsundoku_sessions_evicted_total",
        "Sessions evicted after the retention window",
    )
    .unwrap()
});

/// Login attempts by result.
pub static LOGINS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tsundoku_logins_total", "Total login attempts"),
        &["result"], // "success", "rejected", "error"
    )
    .unwrap()
});

// =============================================================================
// Acquisitions
// =============================================================================

/// Acquisition requests by mode and result.
pub static ACQUISITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tsundoku_acquisitions_total", "Total acquisition requests"),
        &["mode", "result"], // mode: "plain", "smart_select", "deselect"
    )
    .unwrap()
});

/// Time from request to torrents handed to the daemon.
pub static ACQUISITION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tsundoku_acquisition_duration_seconds",
            "Duration of acquisition requests",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["mode"],
    )
    .unwrap()
});

/// Pre-match saves by result.
pub static PREMATCH_SAVES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tsundoku_prematch_saves_total", "Total pre-match saves"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

// =============================================================================
// Download daemon
// =============================================================================

/// Attempts to bring the download daemon back up.
pub static DAEMON_RESTARTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tsundoku_daemon_restarts_total",
            "Attempts to start the download daemon",
        ),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SESSIONS_ACTIVE.clone()),
        Box::new(SESSIONS_EVICTED.clone()),
        Box::new(LOGINS.clone()),
        Box::new(ACQUISITIONS.clone()),
        Box::new(ACQUISITION_DURATION.clone()),
        Box::new(PREMATCH_SAVES.clone()),
        Box::new(DAEMON_RESTARTS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        LOGINS.with_label_values(&["success"]).inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"tsundoku_logins_total".to_string()));
    }
}
