mod metrics;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsundoku_core::acquisition::EventEnvelope;
use tsundoku_core::config::TorrentClientBackend;
use tsundoku_core::{
    load_config, validate_config, AcquisitionService, AnilistClient, AuthService,
    BroadcastEventSink, ClientPlatform, DefaultPlatform, DirectMagnetProvider,
    DownloadClientGateway, FilenameEpisodeParser, PlatformResolver, PreMatchStore,
    ProviderRegistry, QBittorrentClient, SanitizedConfig, SessionRegistry, SqlitePreMatchStore,
    StatusAggregator, TorrentClient,
};

use state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the event channel
const EVENT_BUFFER_SIZE: usize = 256;

/// How often the status reporter samples the application state
const STATUS_INTERVAL: Duration = Duration::from_secs(300);

/// Session holding the configured platform token
const CONFIGURED_SESSION_ID: &str = "configured";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialized yet if the config failed to load.
        eprintln!("Fatal error: {:#}", e);
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("TSUNDOKU_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(config.logging.json);

    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        path = ?config_path,
        config_hash = &config_hash[..16],
        "Configuration loaded"
    );
    info!("Database path: {:?}", config.database.path);

    // Pre-match store
    let prematch: Arc<dyn PreMatchStore> = Arc::new(
        SqlitePreMatchStore::new(&config.database.path)
            .context("Failed to open pre-match store")?,
    );
    if let Some(days) = config.prematch.max_age_days {
        match prematch.delete_older_than(days) {
            Ok(removed) => info!(removed, max_age_days = days, "Pruned old pre-matches"),
            Err(e) => warn!(error = %e, "Failed to prune old pre-matches"),
        }
    }
    info!("Pre-match store initialized");

    // Remote platform
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.platform.timeout_secs as u64))
        .build()
        .context("Failed to build platform HTTP client")?;
    let factory = AnilistClient::factory(http, config.platform.api_url.clone());
    let default = Arc::new(DefaultPlatform::new(Arc::new(ClientPlatform::new(factory("")))));
    info!(api_url = %config.platform.api_url, "Platform client initialized");

    // Sessions
    let sessions = Arc::new(SessionRegistry::new(
        Arc::clone(&factory),
        chrono::Duration::days(config.session.retention_days as i64),
    ));
    let sweeper =
        sessions.start_sweeper(Duration::from_secs(config.session.sweep_interval_secs));
    let auth = AuthService::new(Arc::clone(&sessions), Arc::clone(&default), Arc::clone(&factory));
    let resolver = Arc::new(PlatformResolver::new(Arc::clone(&sessions), default));
    info!(
        retention_days = config.session.retention_days,
        "Session registry initialized"
    );

    // A configured token logs in like any session and becomes the default.
    if let Some(token) = config.platform.token.as_deref().filter(|t| !t.trim().is_empty()) {
        match auth.login(CONFIGURED_SESSION_ID, token).await {
            Ok(session) => info!(
                username = session.username().unwrap_or(""),
                "Default platform authenticated"
            ),
            Err(e) => warn!(error = %e, "Configured platform token rejected, starting as guest"),
        }
    }

    // Download client
    let torrent_client: Arc<dyn TorrentClient> = match config.torrent_client.backend {
        TorrentClientBackend::Qbittorrent => {
            info!("Initializing qBittorrent client at {}", config.torrent_client.url);
            Arc::new(
                QBittorrentClient::new(config.torrent_client.clone())
                    .context("Failed to create qBittorrent client")?,
            )
        }
    };
    let gateway = Arc::new(
        DownloadClientGateway::new(torrent_client, Arc::new(FilenameEpisodeParser::new()))
            .with_metadata_wait(
                Duration::from_secs(config.torrent_client.metadata_wait_secs),
                Duration::from_millis(config.torrent_client.metadata_poll_interval_ms),
            ),
    );

    // Events
    let events = BroadcastEventSink::new(EVENT_BUFFER_SIZE);
    let event_logger = spawn_event_logger(events.subscribe());

    // Acquisition
    let providers = Arc::new(
        ProviderRegistry::new().with_provider(Arc::new(DirectMagnetProvider::new("direct"))),
    );
    let acquisition = Arc::new(AcquisitionService::new(
        Arc::clone(&gateway),
        Arc::clone(&resolver),
        providers,
        Arc::clone(&prematch),
        Arc::new(events.clone()),
    ));
    let status = Arc::new(StatusAggregator::new(gateway, Arc::clone(&prematch)));

    let state = Arc::new(AppState::new(
        config.clone(),
        sessions,
        acquisition,
        status,
        prematch,
    ));

    let backend = state.acquisition().gateway().backend().to_string();
    if state.acquisition().gateway().ensure_running().await {
        info!(backend = %backend, "Download client is reachable");
    } else {
        warn!(backend = %backend, "Download client is not reachable, downloads will fail until it is");
    }
    debug!(config = ?state.sanitized_config(), "Effective configuration");

    let (shutdown_tx, _) = broadcast::channel(1);
    let reporter = spawn_status_reporter(Arc::clone(&state), STATUS_INTERVAL, shutdown_tx.subscribe());

    info!("tsundoku {} ready", VERSION);
    shutdown_signal().await;
    info!("Shutting down...");

    let _ = shutdown_tx.send(());
    if let Err(e) = reporter.await {
        warn!(error = %e, "Status reporter task failed");
    }

    sweeper.stop().await;
    info!("Session sweeper stopped");

    event_logger.abort();
    debug!(metrics = %metrics::encode_metrics(), "Final metrics");

    Ok(())
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log every published event until aborted.
fn spawn_event_logger(mut rx: broadcast::Receiver<EventEnvelope>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(event = %event.name, "Event published"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Periodically sample gauges and log a one-line status.
fn spawn_status_reporter(
    state: Arc<AppState>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(interval) => {
                    let snapshot = metrics::collect_dynamic_metrics(&state).await;
                    info!(
                        sessions = snapshot.sessions,
                        authenticated = snapshot.authenticated,
                        media_downloading = snapshot.media_downloading,
                        prematch_entries = snapshot.prematch_entries,
                        "Status"
                    );
                }
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
