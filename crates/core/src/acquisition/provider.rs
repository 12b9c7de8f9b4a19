//! Magnet link resolution through search providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{AcquisitionError, ProviderTorrent};

/// A search provider that can turn one of its results into a magnet link.
#[async_trait]
pub trait MagnetProvider: Send + Sync {
    /// Name torrents refer to in [`ProviderTorrent::provider`].
    fn name(&self) -> &str;

    async fn resolve_magnet_link(&self, torrent: &ProviderTorrent)
        -> Result<String, AcquisitionError>;
}

/// Providers keyed by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn MagnetProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same name.
    pub fn register(&mut self, provider: Arc<dyn MagnetProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn MagnetProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MagnetProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a torrent's magnet link through its own provider.
    pub async fn resolve(&self, torrent: &ProviderTorrent) -> Result<String, AcquisitionError> {
        let provider = self
            .get(&torrent.provider)
            .ok_or_else(|| AcquisitionError::ProviderNotFound(torrent.provider.clone()))?;

        let magnet = provider.resolve_magnet_link(torrent).await?;
        debug!(provider = %torrent.provider, name = %torrent.name, "Resolved magnet link");
        Ok(magnet)
    }
}

/// Provider for results that already carry a magnet link or an info hash.
pub struct DirectMagnetProvider {
    name: String,
}

impl DirectMagnetProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl MagnetProvider for DirectMagnetProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_magnet_link(
        &self,
        torrent: &ProviderTorrent,
    ) -> Result<String, AcquisitionError> {
        if let Some(magnet) = torrent.magnet_link.as_deref().filter(|m| !m.is_empty()) {
            return Ok(magnet.to_string());
        }

        let hash = torrent.info_hash.trim();
        if hash.is_empty() {
            return Err(AcquisitionError::Provider {
                provider: self.name.clone(),
                message: format!("'{}' has neither a magnet link nor an info hash", torrent.name),
            });
        }

        Ok(format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            hash.to_lowercase(),
            urlencoding::encode(&torrent.name)
        ))
    }
}
