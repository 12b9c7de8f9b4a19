//! Remote metadata platform access.
//!
//! `PlatformClient` is one authenticated (or anonymous) connection to the
//! platform. `Platform` is the higher-level surface the rest of the core uses.
//! `PlatformResolver` picks the right one for a session.

mod anilist;
mod default;
mod resolver;
mod types;

pub use anilist::{AnilistClient, DEFAULT_ANILIST_API_URL};
pub use default::{ClientPlatform, DefaultPlatform};
pub use resolver::PlatformResolver;
pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;

/// Builds a platform client for a token. An empty token yields a guest client.
pub type ClientFactory = Arc<dyn Fn(&str) -> Arc<dyn PlatformClient> + Send + Sync>;

/// Low-level client for the remote metadata platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Token this client authenticates with. Empty for guests.
    fn token(&self) -> &str;

    /// The account behind the token.
    async fn get_viewer(&self) -> Result<Viewer, PlatformError>;

    /// Write list progress and status for one entry.
    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: u32,
        status: MediaListStatus,
    ) -> Result<(), PlatformError>;

    /// Full metadata for one entry.
    async fn get_anime_with_relations(
        &self,
        media_id: MediaId,
    ) -> Result<CompleteAnime, PlatformError>;

    /// Add entries to the user's collection as planned.
    async fn add_to_collection(&self, media_ids: &[MediaId]) -> Result<(), PlatformError>;

    /// The user's tracked collection.
    ///
    /// Implementations may cache; `bypass_cache` forces a fresh fetch.
    async fn get_anime_collection(&self, bypass_cache: bool)
        -> Result<AnimeCollection, PlatformError>;
}

/// Platform operations the acquisition and progress paths use.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The client this platform issues calls through.
    fn client(&self) -> Arc<dyn PlatformClient>;

    /// Write progress, completing the entry once `progress` reaches `total_episodes`.
    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: u32,
        total_episodes: Option<u32>,
    ) -> Result<(), PlatformError>;

    async fn get_anime_with_relations(
        &self,
        media_id: MediaId,
    ) -> Result<CompleteAnime, PlatformError>;

    async fn get_anime_collection(
        &self,
        bypass_cache: bool,
    ) -> Result<AnimeCollection, PlatformError>;

    /// Re-fetch the collection, replacing any cached copy.
    async fn refresh_anime_collection(&self) -> Result<AnimeCollection, PlatformError>;

    async fn add_media_to_collection(&self, media_ids: &[MediaId]) -> Result<(), PlatformError>;
}
