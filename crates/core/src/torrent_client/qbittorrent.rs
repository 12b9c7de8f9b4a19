//! qBittorrent Web API backend.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::TorrentClientConfig;

use super::{AddTorrentRequest, TorrentClient, TorrentClientError, TorrentFile, TorrentInfo, TorrentState};

/// How often `start` re-checks the daemon while waiting for it to come up.
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: TorrentClientConfig,
    /// Session ID cookie (refreshed on auth failure).
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(config: TorrentClientConfig) -> Result<Self, TorrentClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| TorrentClientError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url(), path)
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint("auth/login"))
            .form(&params)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.session.write().await = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }
        self.login().await
    }

    /// Send a request, logging in again once if the session cookie expired.
    ///
    /// The builder closure is invoked per attempt since multipart bodies
    /// cannot be replayed.
    async fn send<F>(&self, build: F) -> Result<Response, TorrentClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let response = build(&self.client).send().await.map_err(map_send_error)?;
        if response.status() != StatusCode::FORBIDDEN {
            return Ok(response);
        }

        warn!("qBittorrent session expired, re-authenticating");
        *self.session.write().await = None;
        self.login().await?;

        build(&self.client).send().await.map_err(map_send_error)
    }

    async fn get(&self, path: &str) -> Result<String, TorrentClientError> {
        let url = self.endpoint(path);
        let response = self.send(|c| c.get(&url)).await?;
        read_body(response).await
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Response, TorrentClientError> {
        let url = self.endpoint(path);
        self.send(|c| c.post(&url).form(params)).await
    }

    /// POST to `primary`, falling back to `fallback` on 404.
    ///
    /// qBittorrent 5 renamed pause/resume to stop/start.
    async fn post_hashes_with_fallback(
        &self,
        primary: &str,
        fallback: &str,
        hash: &str,
    ) -> Result<(), TorrentClientError> {
        let hash = hash.to_lowercase();
        let response = self.post_form(primary, &[("hashes", &hash)]).await?;
        if response.status() != StatusCode::NOT_FOUND {
            read_body(response).await?;
            return Ok(());
        }

        debug!(endpoint = primary, "Endpoint missing, trying {}", fallback);
        let response = self.post_form(fallback, &[("hashes", &hash)]).await?;
        read_body(response).await?;
        Ok(())
    }

    async fn wait_until_running(&self) -> bool {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.startup_wait_secs);

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
            if self.is_running().await {
                return true;
            }
        }
        false
    }
}

fn map_send_error(e: reqwest::Error) -> TorrentClientError {
    if e.is_timeout() {
        TorrentClientError::Timeout
    } else if e.is_connect() {
        TorrentClientError::ConnectionFailed(e.to_string())
    } else {
        TorrentClientError::ApiError(e.to_string())
    }
}

async fn read_body(response: Response) -> Result<String, TorrentClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
    }

    response
        .text()
        .await
        .map_err(|e| TorrentClientError::ApiError(e.to_string()))
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    dlspeed: i64,
    #[serde(default)]
    upspeed: i64,
    #[serde(default)]
    eta: i64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    content_path: String,
}

impl QBTorrentInfo {
    fn into_torrent_info(self) -> TorrentInfo {
        TorrentInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress.clamp(0.0, 1.0),
            size_bytes: self.size.max(0) as u64,
            download_speed: self.dlspeed.max(0) as u64,
            upload_speed: self.upspeed.max(0) as u64,
            // 8640000 is qBittorrent's "infinity" marker
            eta_secs: if self.eta > 0 && self.eta < 8640000 {
                Some(self.eta as u64)
            } else {
                None
            },
            save_path: self.save_path,
            content_path: self.content_path,
        }
    }
}

/// qBittorrent file entry from `torrents/files`.
#[derive(Debug, Deserialize)]
struct QBFile {
    /// Missing on Web API versions before 2.8.2.
    index: Option<usize>,
    name: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    priority: i64,
}

impl QBFile {
    fn into_torrent_file(self, position: usize) -> TorrentFile {
        TorrentFile {
            index: self.index.unwrap_or(position),
            path: self.name,
            size_bytes: self.size.max(0) as u64,
            wanted: self.priority != 0,
        }
    }
}

/// Parse qBittorrent state string to TorrentState.
fn parse_qb_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" | "stalledDL"
        | "queuedDL" | "checkingDL" => TorrentState::Downloading,
        "uploading" | "forcedUP" | "stalledUP" | "queuedUP" | "checkingUP" => {
            TorrentState::Seeding
        }
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
        _ => TorrentState::Unknown,
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn is_running(&self) -> bool {
        match self.get("app/version").await {
            Ok(version) => {
                debug!(version = %version.trim(), "qBittorrent is reachable");
                true
            }
            Err(e) => {
                debug!(error = %e, "qBittorrent is not reachable");
                false
            }
        }
    }

    async fn start(&self) -> Result<(), TorrentClientError> {
        if self.is_running().await {
            return Ok(());
        }

        let Some(executable) = &self.config.executable_path else {
            return Err(TorrentClientError::ClientUnavailable(format!(
                "qBittorrent is not reachable at {}",
                self.base_url()
            )));
        };

        info!(executable = %executable.display(), "Launching qBittorrent");
        // The child is detached: dropping the handle leaves the daemon running.
        Command::new(executable)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TorrentClientError::ClientUnavailable(format!(
                    "failed to launch {}: {}",
                    executable.display(),
                    e
                ))
            })?;

        if self.wait_until_running().await {
            info!("qBittorrent is up");
            Ok(())
        } else {
            Err(TorrentClientError::ClientUnavailable(format!(
                "qBittorrent did not answer within {}s",
                self.config.startup_wait_secs
            )))
        }
    }

    async fn add_torrents(&self, request: AddTorrentRequest) -> Result<(), TorrentClientError> {
        let url = self.endpoint("torrents/add");
        let urls = request.uris.join("\n");

        let response = self
            .send(|c| {
                let mut form = multipart::Form::new()
                    .text("urls", urls.clone())
                    .text("savepath", request.destination.clone());
                if request.paused {
                    form = form.text("paused", "true").text("stopped", "true");
                }
                c.post(&url).multipart(form)
            })
            .await?;

        let body = read_body(response).await?;
        if body.contains("Fails.") {
            // Re-adding an existing torrent also answers "Fails."
            debug!(count = request.uris.len(), "qBittorrent rejected some magnets");
        }
        Ok(())
    }

    async fn list_torrents(&self) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let response = self.get("torrents/info").await?;
        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response).map_err(|e| {
            TorrentClientError::ApiError(format!("Failed to parse response: {}", e))
        })?;

        Ok(torrents.into_iter().map(|t| t.into_torrent_info()).collect())
    }

    async fn torrent_exists(&self, hash: &str) -> Result<bool, TorrentClientError> {
        let response = self
            .get(&format!("torrents/info?hashes={}", hash.to_lowercase()))
            .await?;
        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response).map_err(|e| {
            TorrentClientError::ApiError(format!("Failed to parse response: {}", e))
        })?;

        Ok(!torrents.is_empty())
    }

    async fn get_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        let url = self.endpoint(&format!("torrents/files?hash={}", hash.to_lowercase()));
        let response = self.send(|c| c.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        }

        let body = read_body(response).await?;
        let files: Vec<QBFile> = serde_json::from_str(&body).map_err(|e| {
            TorrentClientError::ApiError(format!("Failed to parse response: {}", e))
        })?;

        Ok(files
            .into_iter()
            .enumerate()
            .map(|(position, f)| f.into_torrent_file(position))
            .collect())
    }

    async fn set_file_priority(
        &self,
        hash: &str,
        indices: &[usize],
        wanted: bool,
    ) -> Result<(), TorrentClientError> {
        if indices.is_empty() {
            return Ok(());
        }

        let hash_lower = hash.to_lowercase();
        let ids = indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let priority = if wanted { "1" } else { "0" };

        let response = self
            .post_form(
                "torrents/filePrio",
                &[("hash", &hash_lower), ("id", &ids), ("priority", priority)],
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        }
        read_body(response).await?;
        Ok(())
    }

    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.post_hashes_with_fallback("torrents/pause", "torrents/stop", hash)
            .await
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.post_hashes_with_fallback("torrents/resume", "torrents/start", hash)
            .await
    }

    async fn remove_torrent(
        &self,
        hash: &str,
        delete_files: bool,
    ) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let delete_str = if delete_files { "true" } else { "false" };

        let response = self
            .post_form(
                "torrents/delete",
                &[("hashes", &hash_lower), ("deleteFiles", delete_str)],
            )
            .await?;
        read_body(response).await?;
        Ok(())
    }
}
