//! Login and logout against the remote platform.

use std::sync::Arc;

use tracing::{info, warn};

use super::{Session, SessionError, SessionRegistry};
use crate::metrics;
use crate::platform::{ClientFactory, ClientPlatform, DefaultPlatform, PlatformError, User};

/// Authenticates sessions and keeps the default platform in step.
pub struct AuthService {
    registry: Arc<SessionRegistry>,
    default: Arc<DefaultPlatform>,
    factory: ClientFactory,
}

impl AuthService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        default: Arc<DefaultPlatform>,
        factory: ClientFactory,
    ) -> Self {
        Self {
            registry,
            default,
            factory,
        }
    }

    /// Verify `token` with the platform and log the session in.
    ///
    /// Authentication failures propagate as-is; the session is left untouched.
    pub async fn login(&self, session_id: &str, token: &str) -> Result<Session, SessionError> {
        if session_id.is_empty() {
            return Err(SessionError::MissingSession);
        }
        let token = token.trim();
        if token.is_empty() {
            metrics::LOGINS.with_label_values(&["rejected"]).inc();
            return Err(SessionError::Authentication("empty token".to_string()));
        }

        let client = (self.factory)(token);
        let viewer = match client.get_viewer().await {
            Ok(viewer) => viewer,
            Err(e) => {
                let result = match e {
                    PlatformError::Authentication(_) => "rejected",
                    _ => "error",
                };
                metrics::LOGINS.with_label_values(&[result]).inc();
                warn!(session_id, error = %e, "Login failed");
                return Err(e.into());
            }
        };

        if viewer.name.is_empty() {
            metrics::LOGINS.with_label_values(&["rejected"]).inc();
            return Err(SessionError::Authentication(
                "platform returned no viewer name".to_string(),
            ));
        }

        let session = self.registry.login(session_id, token, viewer);
        self.default
            .replace(Arc::new(ClientPlatform::new(client)), session.to_user());

        metrics::LOGINS.with_label_values(&["success"]).inc();
        Ok(session)
    }

    /// Demote the session to a guest.
    ///
    /// The default platform moves to the most recently active session still
    /// logged in, or back to the guest when none is left.
    pub fn logout(&self, session_id: &str) -> Result<Session, SessionError> {
        if session_id.is_empty() {
            return Err(SessionError::MissingSession);
        }

        let session = self.registry.logout(session_id);

        let successor = self
            .registry
            .list_authenticated()
            .into_iter()
            .max_by_key(|s| s.last_accessed());

        match successor {
            Some(other) => {
                let client = self.registry.get_client(other.id());
                self.default
                    .replace(Arc::new(ClientPlatform::new(client)), other.to_user());
            }
            None => {
                info!("No authenticated sessions left, default platform is now the guest");
                self.default.replace(
                    Arc::new(ClientPlatform::new((self.factory)(""))),
                    User::simulated(),
                );
            }
        }

        Ok(session)
    }

    /// Public view of who a session acts as.
    pub fn current_user(&self, session_id: &str) -> User {
        if session_id.is_empty() {
            return self.default.user();
        }
        self.registry.get(session_id).to_user()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockPlatformBackend};

    struct Fixture {
        backend: Arc<MockPlatformBackend>,
        registry: Arc<SessionRegistry>,
        default: Arc<DefaultPlatform>,
        auth: AuthService,
    }

    fn setup() -> Fixture {
        let backend = Arc::new(MockPlatformBackend::new());
        let registry = Arc::new(SessionRegistry::new(
            backend.factory(),
            chrono::Duration::days(7),
        ));
        let default = Arc::new(DefaultPlatform::new(Arc::new(ClientPlatform::new(
            backend.client(""),
        ))));
        let auth = AuthService::new(registry.clone(), default.clone(), backend.factory());
        Fixture {
            backend,
            registry,
            default,
            auth,
        }
    }

    #[tokio::test]
    async fn test_login_stores_session_and_promotes_default() {
        let f = setup();
        f.backend.set_viewer("tok-1", fixtures::viewer("alice")).await;

        let session = f.auth.login("s1", "tok-1").await.unwrap();

        assert!(session.is_authenticated());
        assert_eq!(f.registry.get_client("s1").token(), "tok-1");
        assert_eq!(f.default.get().client().token(), "tok-1");
        assert_eq!(f.auth.current_user("s1").token, "HIDDEN");
    }

    #[tokio::test]
    async fn test_login_with_rejected_token_propagates() {
        let f = setup();

        let err = f.auth.login("s1", "bad").await.unwrap_err();

        assert!(matches!(err, SessionError::Authentication(_)));
        assert!(f.registry.list_authenticated().is_empty());
        assert_eq!(f.default.get().client().token(), "");
    }

    #[tokio::test]
    async fn test_login_rejects_empty_viewer_name() {
        let f = setup();
        f.backend.set_viewer("tok-1", fixtures::viewer("")).await;

        let err = f.auth.login("s1", "tok-1").await.unwrap_err();

        assert!(matches!(err, SessionError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_login_requires_session_id() {
        let f = setup();
        assert!(matches!(
            f.auth.login("", "tok").await,
            Err(SessionError::MissingSession)
        ));
        assert!(matches!(f.auth.logout(""), Err(SessionError::MissingSession)));
    }

    #[tokio::test]
    async fn test_last_logout_resets_default_to_guest() {
        let f = setup();
        f.backend.set_viewer("tok-1", fixtures::viewer("alice")).await;
        f.backend.set_viewer("tok-2", fixtures::viewer("bob")).await;
        f.auth.login("s1", "tok-1").await.unwrap();
        f.auth.login("s2", "tok-2").await.unwrap();

        f.auth.logout("s2").unwrap();
        assert_eq!(f.default.get().client().token(), "tok-1");
        assert!(!f.default.user().is_simulated);

        let session = f.auth.logout("s1").unwrap();
        assert!(session.is_simulated());
        assert_eq!(f.default.get().client().token(), "");
        assert!(f.default.user().is_simulated);
        assert!(f.auth.current_user("").is_simulated);
    }
}
