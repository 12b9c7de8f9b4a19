//! AniList GraphQL client.
//!
//! Anonymous clients (empty token) can read media metadata; anything that
//! touches the user's list needs a token.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    AnimeCollection, AnimeListEntry, BaseAnime, ClientFactory, CompleteAnime, MediaId,
    MediaListStatus, PlatformClient, PlatformError, Viewer,
};

/// Public AniList GraphQL endpoint.
pub const DEFAULT_ANILIST_API_URL: &str = "https://graphql.anilist.co";

const VIEWER_QUERY: &str = r#"
query {
  Viewer { id name avatar { large } bannerImage }
}"#;

const SAVE_ENTRY_MUTATION: &str = r#"
mutation ($mediaId: Int, $progress: Int, $status: MediaListStatus) {
  SaveMediaListEntry(mediaId: $mediaId, progress: $progress, status: $status) { id }
}"#;

const ADD_ENTRY_MUTATION: &str = r#"
mutation ($mediaId: Int, $status: MediaListStatus) {
  SaveMediaListEntry(mediaId: $mediaId, status: $status) { id }
}"#;

const MEDIA_QUERY: &str = r#"
query ($id: Int) {
  Media(id: $id, type: ANIME) {
    id title { userPreferred romaji english } episodes format status type
    relations { edges { node { id title { userPreferred romaji english } episodes format status type } } }
  }
}"#;

const COLLECTION_QUERY: &str = r#"
query ($userName: String) {
  MediaListCollection(userName: $userName, type: ANIME) {
    lists { entries { status progress media { id title { userPreferred romaji english } episodes format status type } } }
  }
}"#;

/// AniList API client for one token.
pub struct AnilistClient {
    http: Client,
    api_url: String,
    token: String,
    collection: RwLock<Option<AnimeCollection>>,
}

impl AnilistClient {
    /// Create a client sharing an existing HTTP connection pool.
    pub fn new(http: Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            token: token.into(),
            collection: RwLock::new(None),
        }
    }

    /// Factory producing AniList clients that share one connection pool.
    pub fn factory(http: Client, api_url: impl Into<String>) -> ClientFactory {
        let api_url = api_url.into();
        Arc::new(move |token: &str| {
            Arc::new(AnilistClient::new(http.clone(), api_url.clone(), token))
                as Arc<dyn PlatformClient>
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, PlatformError> {
        let mut request = self
            .http
            .post(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "query": query, "variables": variables }));
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        decode_response(status, &body)
    }

    fn require_token(&self) -> Result<(), PlatformError> {
        if self.token.is_empty() {
            return Err(PlatformError::Authentication(
                "no token, log in first".to_string(),
            ));
        }
        Ok(())
    }

    async fn invalidate_collection(&self) {
        *self.collection.write().await = None;
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

/// Turn an HTTP status and GraphQL envelope into data or an error.
fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, PlatformError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(PlatformError::Authentication(
            "token rejected by AniList".to_string(),
        ));
    }

    let envelope: GraphQlResponse = serde_json::from_str(body).map_err(|e| {
        if status.is_success() {
            PlatformError::Parse(e.to_string())
        } else {
            PlatformError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            }
        }
    })?;

    if let Some(error) = envelope.errors.first() {
        if error.message.contains("Invalid token") || error.status == Some(401) {
            return Err(PlatformError::Authentication(error.message.clone()));
        }
        return Err(PlatformError::Api {
            status: error.status.unwrap_or(status.as_u16()),
            message: error.message.clone(),
        });
    }
    if !status.is_success() {
        return Err(PlatformError::Api {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| PlatformError::Parse("response has no data".to_string()))?;
    serde_json::from_value(data).map_err(|e| PlatformError::Parse(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaTitle {
    user_preferred: Option<String>,
    romaji: Option<String>,
    english: Option<String>,
}

impl MediaTitle {
    fn best(self) -> String {
        self.user_preferred
            .or(self.english)
            .or(self.romaji)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct MediaNode {
    id: MediaId,
    title: MediaTitle,
    episodes: Option<u32>,
    format: Option<String>,
    status: Option<String>,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

impl MediaNode {
    fn is_anime(&self) -> bool {
        self.media_type.as_deref().map_or(true, |t| t == "ANIME")
    }

    fn into_base_anime(self) -> BaseAnime {
        BaseAnime {
            id: self.id,
            title: self.title.best(),
            episodes: self.episodes,
            format: self.format,
            status: self.status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaWithRelations {
    #[serde(flatten)]
    node: MediaNode,
    relations: Option<RelationConnection>,
}

#[derive(Debug, Deserialize)]
struct RelationConnection {
    #[serde(default)]
    edges: Vec<RelationEdge>,
}

#[derive(Debug, Deserialize)]
struct RelationEdge {
    node: Option<MediaNode>,
}

impl MediaWithRelations {
    fn into_complete_anime(self) -> CompleteAnime {
        let relations = self
            .relations
            .map(|r| r.edges)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|edge| edge.node)
            .filter(|node| node.is_anime())
            .map(|node| node.into_base_anime())
            .collect();

        CompleteAnime {
            anime: self.node.into_base_anime(),
            relations,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    #[serde(rename = "Viewer")]
    viewer: Option<ViewerNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerNode {
    id: i32,
    name: String,
    avatar: Option<ViewerAvatar>,
    banner_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewerAvatar {
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<MediaWithRelations>,
}

#[derive(Debug, Deserialize)]
struct CollectionData {
    #[serde(rename = "MediaListCollection")]
    collection: Option<CollectionNode>,
}

#[derive(Debug, Deserialize)]
struct CollectionNode {
    #[serde(default)]
    lists: Vec<Option<CollectionList>>,
}

#[derive(Debug, Deserialize)]
struct CollectionList {
    #[serde(default)]
    entries: Vec<Option<CollectionEntry>>,
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    status: Option<MediaListStatus>,
    progress: Option<u32>,
    media: Option<MediaNode>,
}

impl CollectionNode {
    fn into_collection(self) -> AnimeCollection {
        let entries = self
            .lists
            .into_iter()
            .flatten()
            .flat_map(|list| list.entries)
            .flatten()
            .filter_map(|entry| {
                let media = entry.media?;
                Some(AnimeListEntry {
                    media: media.into_base_anime(),
                    status: entry.status,
                    progress: entry.progress.unwrap_or(0),
                })
            })
            .collect();

        AnimeCollection { entries }
    }
}

#[async_trait]
impl PlatformClient for AnilistClient {
    fn token(&self) -> &str {
        &self.token
    }

    async fn get_viewer(&self) -> Result<Viewer, PlatformError> {
        self.require_token()?;
        let data: ViewerData = self.query(VIEWER_QUERY, json!({})).await?;
        let node = data
            .viewer
            .ok_or_else(|| PlatformError::Authentication("no viewer for token".to_string()))?;

        Ok(Viewer {
            id: node.id,
            name: node.name,
            avatar: node.avatar.and_then(|a| a.large),
            banner_image: node.banner_image,
        })
    }

    async fn update_entry_progress(
        &self,
        media_id: MediaId,
        progress: u32,
        status: MediaListStatus,
    ) -> Result<(), PlatformError> {
        self.require_token()?;
        debug!(media_id, progress, status = status.as_str(), "AniList progress update");

        let _: Value = self
            .query(
                SAVE_ENTRY_MUTATION,
                json!({ "mediaId": media_id, "progress": progress, "status": status.as_str() }),
            )
            .await?;
        self.invalidate_collection().await;
        Ok(())
    }

    async fn get_anime_with_relations(
        &self,
        media_id: MediaId,
    ) -> Result<CompleteAnime, PlatformError> {
        debug!(media_id, "AniList get media");
        let data: MediaData = match self.query(MEDIA_QUERY, json!({ "id": media_id })).await {
            Err(PlatformError::Api { status: 404, .. }) => {
                return Err(PlatformError::NotFound(media_id))
            }
            other => other?,
        };

        data.media
            .map(MediaWithRelations::into_complete_anime)
            .ok_or(PlatformError::NotFound(media_id))
    }

    async fn add_to_collection(&self, media_ids: &[MediaId]) -> Result<(), PlatformError> {
        self.require_token()?;

        for media_id in media_ids {
            debug!(media_id, "AniList add to collection");
            let _: Value = self
                .query(
                    ADD_ENTRY_MUTATION,
                    json!({ "mediaId": media_id, "status": MediaListStatus::Planning.as_str() }),
                )
                .await?;
        }
        self.invalidate_collection().await;
        Ok(())
    }

    async fn get_anime_collection(
        &self,
        bypass_cache: bool,
    ) -> Result<AnimeCollection, PlatformError> {
        self.require_token()?;

        if !bypass_cache {
            if let Some(cached) = self.collection.read().await.as_ref() {
                return Ok(cached.clone());
            }
        }

        let viewer = self.get_viewer().await?;
        let data: CollectionData = self
            .query(COLLECTION_QUERY, json!({ "userName": viewer.name }))
            .await?;
        let collection = data
            .collection
            .map(CollectionNode::into_collection)
            .unwrap_or_default();

        debug!(entries = collection.entries.len(), "AniList collection fetched");
        *self.collection.write().await = Some(collection.clone());
        Ok(collection)
    }
}
