//! Client-backed platform and the process-wide default holder.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    progress_status, AnimeCollection, CompleteAnime, MediaId, Platform, PlatformClient,
    PlatformError, User,
};

/// `Platform` over a single client.
pub struct ClientPlatform {
    client: Arc<dyn PlatformClient>,
}

impl ClientPlatform {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Platform for ClientPlatform {
    fn client(&self) -> Arc<dyn PlatformClient> {
        Arc::clone(&self.client)
    }

    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: u32,
        total_episodes: Option<u32>,
    ) -> Result<(), PlatformError> {
        let (progress, status) = progress_status(progress, total_episodes);
        debug!(media_id, progress, status = status.as_str(), "Updating entry progress");
        self.client
            .update_entry_progress(media_id, progress, status)
            .await
    }

    async fn get_anime_with_relations(
        &self,
        media_id: MediaId,
    ) -> Result<CompleteAnime, PlatformError> {
        self.client.get_anime_with_relations(media_id).await
    }

    async fn get_anime_collection(
        &self,
        bypass_cache: bool,
    ) -> Result<AnimeCollection, PlatformError> {
        self.client.get_anime_collection(bypass_cache).await
    }

    async fn refresh_anime_collection(&self) -> Result<AnimeCollection, PlatformError> {
        self.client.get_anime_collection(true).await
    }

    async fn add_media_to_collection(&self, media_ids: &[MediaId]) -> Result<(), PlatformError> {
        self.client.add_to_collection(media_ids).await
    }
}

struct DefaultState {
    platform: Arc<dyn Platform>,
    user: User,
}

/// The platform used when a request carries no authenticated session.
///
/// Swapped on login/logout. Passed explicitly to whoever needs a fallback.
pub struct DefaultPlatform {
    state: RwLock<DefaultState>,
}

impl DefaultPlatform {
    /// Start out as the guest.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            state: RwLock::new(DefaultState {
                platform,
                user: User::simulated(),
            }),
        }
    }

    pub fn get(&self) -> Arc<dyn Platform> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.platform)
    }

    /// The user the default platform acts as.
    pub fn user(&self) -> User {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.user.clone()
    }

    /// Replace the default platform and the user it acts as.
    pub fn replace(&self, platform: Arc<dyn Platform>, user: User) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        info!(simulated = user.is_simulated, "Default platform replaced");
        state.platform = platform;
        state.user = user;
    }
}
