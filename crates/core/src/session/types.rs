//! Session types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::platform::{PlatformError, User, Viewer};

/// Errors from login/logout.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request carried no session id.
    #[error("Missing session id")]
    MissingSession,

    /// The platform rejected the token or returned no usable identity.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Platform(PlatformError),
}

impl From<PlatformError> for SessionError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Authentication(message) => SessionError::Authentication(message),
            other => SessionError::Platform(other),
        }
    }
}

/// One browser connection's identity.
///
/// Simulated sessions never carry a token or a viewer; the constructors are
/// the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: String,
    #[serde(skip)]
    token: String,
    username: Option<String>,
    viewer: Option<Viewer>,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    is_simulated: bool,
}

impl Session {
    /// A guest session.
    pub fn simulated(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            token: String::new(),
            username: None,
            viewer: None,
            created_at: now,
            last_accessed: now,
            is_simulated: true,
        }
    }

    /// A session logged in as `viewer`.
    pub fn authenticated(id: impl Into<String>, token: impl Into<String>, viewer: Viewer) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            token: token.into(),
            username: Some(viewer.name.clone()),
            viewer: Some(viewer),
            created_at: now,
            last_accessed: now,
            is_simulated: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Platform token. Empty for guests.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn is_simulated(&self) -> bool {
        self.is_simulated
    }

    /// Logged in with a real token.
    pub fn is_authenticated(&self) -> bool {
        !self.is_simulated && !self.token.is_empty()
    }

    pub(crate) fn touch_at(&mut self, at: DateTime<Utc>) {
        self.last_accessed = at;
    }

    /// Public view with the token redacted.
    pub fn to_user(&self) -> User {
        if !self.is_authenticated() {
            return User::simulated();
        }
        User {
            viewer: self.viewer.clone(),
            token: "HIDDEN".to_string(),
            is_simulated: false,
        }
    }
}
