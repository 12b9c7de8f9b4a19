//! Mock remote metadata platform for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::platform::{
    AnimeCollection, AnimeListEntry, ClientFactory, CompleteAnime, MediaId, MediaListStatus,
    PlatformClient, PlatformError, Viewer,
};

/// A recorded progress write.
pub type ProgressUpdate = (MediaId, u32, MediaListStatus);

/// Shared fake of the remote platform.
///
/// Every [`MockPlatformClient`] built from the same backend sees the same
/// accounts, metadata and collections, and its calls are recorded per token.
///
/// # Example
///
/// ```rust,ignore
/// let backend = Arc::new(MockPlatformBackend::new());
/// backend.set_viewer("tok", fixtures::viewer("alice")).await;
///
/// let registry = SessionRegistry::new(backend.factory(), chrono::Duration::days(7));
/// registry.login("s1", "tok", fixtures::viewer("alice"));
///
/// // ... drive the code under test ...
/// assert_eq!(backend.added_to_collection("tok").await, vec![42]);
/// ```
#[derive(Debug, Default)]
pub struct MockPlatformBackend {
    viewers: RwLock<HashMap<String, Viewer>>,
    anime: RwLock<HashMap<MediaId, CompleteAnime>>,
    collections: RwLock<HashMap<String, AnimeCollection>>,
    progress: RwLock<Vec<(String, ProgressUpdate)>>,
    added: RwLock<Vec<(String, MediaId)>>,
    collection_fetches: RwLock<Vec<(String, bool)>>,
    fail_metadata: RwLock<bool>,
    fail_add: RwLock<bool>,
}

impl MockPlatformBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client for `token` over this backend.
    pub fn client(self: &Arc<Self>, token: &str) -> Arc<MockPlatformClient> {
        Arc::new(MockPlatformClient {
            token: token.to_string(),
            backend: Arc::clone(self),
        })
    }

    /// Factory building clients over this backend.
    pub fn factory(self: &Arc<Self>) -> ClientFactory {
        let backend = Arc::clone(self);
        Arc::new(move |token: &str| backend.client(token) as Arc<dyn PlatformClient>)
    }

    /// Accept `token` as logging in `viewer`. Unknown tokens are rejected.
    pub async fn set_viewer(&self, token: &str, viewer: Viewer) {
        self.viewers.write().await.insert(token.to_string(), viewer);
    }

    /// Metadata returned by `get_anime_with_relations`.
    pub async fn set_anime(&self, anime: CompleteAnime) {
        self.anime.write().await.insert(anime.id(), anime);
    }

    /// Make metadata lookups fail with an API error.
    pub async fn set_fail_metadata(&self, fail: bool) {
        *self.fail_metadata.write().await = fail;
    }

    /// Make `add_to_collection` fail with an API error.
    pub async fn set_fail_add(&self, fail: bool) {
        *self.fail_add.write().await = fail;
    }

    pub async fn set_collection(&self, token: &str, collection: AnimeCollection) {
        self.collections
            .write()
            .await
            .insert(token.to_string(), collection);
    }

    pub async fn progress_updates_for(&self, token: &str) -> Vec<ProgressUpdate> {
        self.progress
            .read()
            .await
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, update)| *update)
            .collect()
    }

    /// Media ids added to the collection of `token`, in call order.
    pub async fn added_to_collection(&self, token: &str) -> Vec<MediaId> {
        self.added
            .read()
            .await
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, id)| *id)
            .collect()
    }

    /// `(token, bypass_cache)` for every collection fetch.
    pub async fn collection_fetches(&self) -> Vec<(String, bool)> {
        self.collection_fetches.read().await.clone()
    }
}

/// Mock implementation of the PlatformClient trait for one token.
#[derive(Debug)]
pub struct MockPlatformClient {
    token: String,
    backend: Arc<MockPlatformBackend>,
}

impl MockPlatformClient {
    /// A standalone client with its own empty backend.
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            backend: Arc::new(MockPlatformBackend::new()),
        }
    }

    pub fn backend(&self) -> &Arc<MockPlatformBackend> {
        &self.backend
    }

    /// Progress writes made with this client's token.
    pub async fn progress_updates(&self) -> Vec<ProgressUpdate> {
        self.backend.progress_updates_for(&self.token).await
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    fn token(&self) -> &str {
        &self.token
    }

    async fn get_viewer(&self) -> Result<Viewer, PlatformError> {
        self.backend
            .viewers
            .read()
            .await
            .get(&self.token)
            .cloned()
            .ok_or_else(|| PlatformError::Authentication("Invalid token".to_string()))
    }

    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: u32,
        status: MediaListStatus,
    ) -> Result<(), PlatformError> {
        self.backend
            .progress
            .write()
            .await
            .push((self.token.clone(), (media_id, progress, status)));
        Ok(())
    }

    async fn get_anime_with_relations(
        &self,
        media_id: MediaId,
    ) -> Result<CompleteAnime, PlatformError> {
        if *self.backend.fail_metadata.read().await {
            return Err(PlatformError::Api {
                status: 500,
                message: "simulated metadata failure".to_string(),
            });
        }
        self.backend
            .anime
            .read()
            .await
            .get(&media_id)
            .cloned()
            .ok_or(PlatformError::NotFound(media_id))
    }

    async fn add_to_collection(&self, media_ids: &[MediaId]) -> Result<(), PlatformError> {
        if *self.backend.fail_add.read().await {
            return Err(PlatformError::Api {
                status: 500,
                message: "simulated add failure".to_string(),
            });
        }

        let anime = self.backend.anime.read().await;
        let mut collections = self.backend.collections.write().await;
        let mut added = self.backend.added.write().await;

        let collection = collections.entry(self.token.clone()).or_default();
        for media_id in media_ids {
            added.push((self.token.clone(), *media_id));
            if collection.contains(*media_id) {
                continue;
            }
            if let Some(entry) = anime.get(media_id) {
                collection.entries.push(AnimeListEntry {
                    media: entry.anime.clone(),
                    status: Some(MediaListStatus::Planning),
                    progress: 0,
                });
            }
        }
        Ok(())
    }

    async fn get_anime_collection(
        &self,
        bypass_cache: bool,
    ) -> Result<AnimeCollection, PlatformError> {
        self.backend
            .collection_fetches
            .write()
            .await
            .push((self.token.clone(), bypass_cache));

        Ok(self
            .backend
            .collections
            .read()
            .await
            .get(&self.token)
            .cloned()
            .unwrap_or_default())
    }
}
