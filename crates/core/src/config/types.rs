use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::platform::DEFAULT_ANILIST_API_URL;
use crate::session::DEFAULT_RETENTION_DAYS;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub torrent_client: TorrentClientConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub prematch: PreMatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tsundoku.db")
}

/// Session registry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Days of inactivity before a session is evicted (default: 7)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Seconds between eviction sweeps (default: 3600)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS as u32
}

fn default_sweep_interval() -> u64 {
    3600
}

/// Available download daemons
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentClientBackend {
    #[default]
    Qbittorrent,
}

impl TorrentClientBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentClientBackend::Qbittorrent => "qbittorrent",
        }
    }
}

/// Download daemon configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentClientConfig {
    #[serde(default)]
    pub backend: TorrentClientBackend,
    /// Web API URL (e.g., "http://localhost:8080")
    #[serde(default = "default_torrent_client_url")]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Daemon binary to launch when it does not answer
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    /// How long to wait for a launched daemon to answer (default: 10)
    #[serde(default = "default_startup_wait")]
    pub startup_wait_secs: u64,
    /// How long smart select waits for magnet metadata (default: 60)
    #[serde(default = "default_metadata_wait")]
    pub metadata_wait_secs: u64,
    #[serde(default = "default_metadata_poll_interval")]
    pub metadata_poll_interval_ms: u64,
}

impl Default for TorrentClientConfig {
    fn default() -> Self {
        Self {
            backend: TorrentClientBackend::default(),
            url: default_torrent_client_url(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout(),
            executable_path: None,
            startup_wait_secs: default_startup_wait(),
            metadata_wait_secs: default_metadata_wait(),
            metadata_poll_interval_ms: default_metadata_poll_interval(),
        }
    }
}

fn default_torrent_client_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u32 {
    30
}

fn default_startup_wait() -> u64 {
    10
}

fn default_metadata_wait() -> u64 {
    60
}

fn default_metadata_poll_interval() -> u64 {
    1000
}

/// Remote metadata platform configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// GraphQL endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Token the default platform starts with, instead of the guest
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout(),
            token: None,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_ANILIST_API_URL.to_string()
}

/// Pre-match table maintenance
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PreMatchConfig {
    /// Prune entries older than this many days at startup
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json: bool,
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub torrent_client: SanitizedTorrentClientConfig,
    pub platform: SanitizedPlatformConfig,
    pub prematch: PreMatchConfig,
    pub logging: LoggingConfig,
}

/// Sanitized download daemon config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTorrentClientConfig {
    pub backend: String,
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<PathBuf>,
    pub startup_wait_secs: u64,
    pub metadata_wait_secs: u64,
    pub metadata_poll_interval_ms: u64,
}

/// Sanitized platform config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPlatformConfig {
    pub api_url: String,
    pub timeout_secs: u32,
    pub token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let tc = &config.torrent_client;
        Self {
            database: config.database.clone(),
            session: config.session.clone(),
            torrent_client: SanitizedTorrentClientConfig {
                backend: tc.backend.as_str().to_string(),
                url: tc.url.clone(),
                username: tc.username.clone(),
                password_configured: !tc.password.is_empty(),
                timeout_secs: tc.timeout_secs,
                executable_path: tc.executable_path.clone(),
                startup_wait_secs: tc.startup_wait_secs,
                metadata_wait_secs: tc.metadata_wait_secs,
                metadata_poll_interval_ms: tc.metadata_poll_interval_ms,
            },
            platform: SanitizedPlatformConfig {
                api_url: config.platform.api_url.clone(),
                timeout_secs: config.platform.timeout_secs,
                token_configured: config
                    .platform
                    .token
                    .as_deref()
                    .is_some_and(|t| !t.is_empty()),
            },
            prematch: config.prematch.clone(),
            logging: config.logging.clone(),
        }
    }
}
