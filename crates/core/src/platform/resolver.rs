//! Per-request platform resolution.

use std::sync::Arc;

use tracing::debug;

use super::{ClientPlatform, DefaultPlatform, MediaId, Platform, PlatformClient, PlatformError, User};
use crate::session::SessionRegistry;

/// Resolves the platform client, token and user for a session id.
///
/// An empty session id, or a resolver built without a registry, means "no
/// session context": everything falls back to the default platform. Every
/// method returns something usable.
#[derive(Clone)]
pub struct PlatformResolver {
    registry: Option<Arc<SessionRegistry>>,
    default: Arc<DefaultPlatform>,
}

impl PlatformResolver {
    pub fn new(registry: Arc<SessionRegistry>, default: Arc<DefaultPlatform>) -> Self {
        Self {
            registry: Some(registry),
            default,
        }
    }

    /// Resolver that always uses the default platform.
    pub fn without_sessions(default: Arc<DefaultPlatform>) -> Self {
        Self {
            registry: None,
            default,
        }
    }

    pub fn default_platform(&self) -> &Arc<DefaultPlatform> {
        &self.default
    }

    fn registry_for(&self, session_id: &str) -> Option<&Arc<SessionRegistry>> {
        if session_id.is_empty() {
            return None;
        }
        self.registry.as_ref()
    }

    /// The session's cached client, or the default platform's client.
    pub fn client_for(&self, session_id: &str) -> Arc<dyn PlatformClient> {
        match self.registry_for(session_id) {
            Some(registry) => registry.get_client(session_id),
            None => self.default.get().client(),
        }
    }

    /// The token requests for this session authenticate with.
    pub fn token_for(&self, session_id: &str) -> String {
        match self.registry_for(session_id) {
            Some(registry) => registry.get(session_id).token().to_string(),
            None => self.default.get().client().token().to_string(),
        }
    }

    /// Public view of who this session acts as.
    pub fn user_for(&self, session_id: &str) -> User {
        match self.registry_for(session_id) {
            Some(registry) => registry.get(session_id).to_user(),
            None => self.default.user(),
        }
    }

    /// Platform for writes on behalf of a session.
    ///
    /// Authenticated sessions go through their own client; guests and
    /// requests without a session use the default platform.
    pub fn platform_for(&self, session_id: &str) -> Arc<dyn Platform> {
        if let Some(registry) = self.registry_for(session_id) {
            let session = registry.get(session_id);
            if session.is_authenticated() {
                return Arc::new(ClientPlatform::new(registry.get_client(session_id)));
            }
            debug!(session_id, "Session not authenticated, using default platform");
        }
        self.default.get()
    }

    /// Write progress for a session, completing the entry at `total_episodes`.
    pub async fn update_entry_progress(
        &self,
        session_id: &str,
        media_id: MediaId,
        progress: u32,
        total_episodes: Option<u32>,
    ) -> Result<(), PlatformError> {
        self.platform_for(session_id)
            .update_entry_progress(media_id, progress, total_episodes)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MediaListStatus;
    use crate::testing::{fixtures, MockPlatformBackend, MockPlatformClient};

    fn setup() -> (Arc<SessionRegistry>, PlatformResolver, Arc<MockPlatformBackend>) {
        let backend = Arc::new(MockPlatformBackend::new());
        let default = Arc::new(DefaultPlatform::new(Arc::new(ClientPlatform::new(
            backend.client(""),
        ))));
        let registry = Arc::new(SessionRegistry::new(
            backend.factory(),
            chrono::Duration::days(7),
        ));
        let resolver = PlatformResolver::new(registry.clone(), default);
        (registry, resolver, backend)
    }

    #[test]
    fn test_empty_session_uses_default() {
        let (registry, resolver, _) = setup();

        assert_eq!(resolver.client_for("").token(), "");
        assert_eq!(resolver.token_for(""), "");
        assert!(resolver.user_for("").is_simulated);
        assert!(registry.list_all().is_empty());
    }

    #[test]
    fn test_authenticated_session_gets_own_client() {
        let (registry, resolver, _) = setup();
        registry.login("s1", "tok-1", fixtures::viewer("alice"));

        assert_eq!(resolver.client_for("s1").token(), "tok-1");
        assert_eq!(resolver.token_for("s1"), "tok-1");
        assert_eq!(resolver.user_for("s1").token, "HIDDEN");
        assert_eq!(resolver.client_for("s2").token(), "");
    }

    #[tokio::test]
    async fn test_progress_for_authenticated_session() {
        let (registry, resolver, backend) = setup();
        registry.login("s1", "tok-1", fixtures::viewer("alice"));

        resolver
            .update_entry_progress("s1", 42, 13, Some(12))
            .await
            .unwrap();

        assert_eq!(
            backend.progress_updates_for("tok-1").await,
            vec![(42, 12, MediaListStatus::Completed)]
        );
        assert!(backend.progress_updates_for("").await.is_empty());
    }

    #[tokio::test]
    async fn test_progress_for_guest_falls_back_to_default() {
        let (_registry, resolver, backend) = setup();

        resolver
            .update_entry_progress("guest-session", 42, 2, Some(12))
            .await
            .unwrap();

        assert_eq!(
            backend.progress_updates_for("").await,
            vec![(42, 2, MediaListStatus::Current)]
        );
    }

    #[test]
    fn test_without_sessions() {
        let default = Arc::new(DefaultPlatform::new(Arc::new(ClientPlatform::new(Arc::new(
            MockPlatformClient::new("global"),
        )))));
        let resolver = PlatformResolver::without_sessions(default);

        assert_eq!(resolver.client_for("s1").token(), "global");
        assert_eq!(resolver.token_for("s1"), "global");
    }
}
