//! Mock magnet provider and event sink for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::acquisition::{AcquisitionError, EventSink, MagnetProvider, ProviderTorrent};

/// Mock implementation of the MagnetProvider trait.
///
/// Resolves every torrent to `magnet:?xt=urn:btih:{info_hash}&dn={info_hash}`
/// unless a failure is configured for its info hash.
#[derive(Debug, Clone)]
pub struct MockMagnetProvider {
    name: String,
    failures: Arc<RwLock<HashMap<String, String>>>,
    resolved: Arc<RwLock<Vec<String>>>,
}

impl MockMagnetProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failures: Arc::new(RwLock::new(HashMap::new())),
            resolved: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Fail resolution for this info hash with the given message.
    pub async fn fail_hash(&self, info_hash: &str, message: &str) {
        self.failures
            .write()
            .await
            .insert(info_hash.to_string(), message.to_string());
    }

    /// Info hashes resolved so far, including failed attempts.
    pub async fn resolved(&self) -> Vec<String> {
        self.resolved.read().await.clone()
    }
}

#[async_trait]
impl MagnetProvider for MockMagnetProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_magnet_link(
        &self,
        torrent: &ProviderTorrent,
    ) -> Result<String, AcquisitionError> {
        self.resolved.write().await.push(torrent.info_hash.clone());

        if let Some(message) = self.failures.read().await.get(&torrent.info_hash) {
            return Err(AcquisitionError::Provider {
                provider: self.name.clone(),
                message: message.clone(),
            });
        }
        Ok(super::fixtures::magnet_for(&torrent.info_hash))
    }
}

/// Event sink that keeps every published event.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far, in publish order.
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the events so far.
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, name: &str, payload: Value) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), payload));
    }
}
