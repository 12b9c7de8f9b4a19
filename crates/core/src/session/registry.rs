//! In-memory session registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Session, SessionSweeper};
use crate::metrics;
use crate::platform::{ClientFactory, PlatformClient, Viewer};

/// Default inactivity window before a session is evicted.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, Session>,
    clients: HashMap<String, Arc<dyn PlatformClient>>,
}

impl RegistryState {
    fn record_size(&self) {
        metrics::SESSIONS_ACTIVE.set(self.sessions.len() as i64);
    }

    fn token_of(&self, session_id: &str) -> String {
        self.sessions
            .get(session_id)
            .map(|s| s.token().to_string())
            .unwrap_or_default()
    }
}

/// Sessions and their cached platform clients, keyed by session id.
///
/// Both maps live behind one lock. Callers only ever receive clones of
/// sessions and shared handles to clients. Clients are built outside the lock.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    factory: ClientFactory,
    retention: Duration,
}

impl SessionRegistry {
    pub fn new(factory: ClientFactory, retention: Duration) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            factory,
            retention,
        }
    }

    /// Random id for a browser that has none yet.
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a session, creating a simulated one on first sight.
    ///
    /// Always refreshes the last-accessed time.
    pub fn get(&self, session_id: &str) -> Session {
        let now = Utc::now();
        let mut state = self.write();

        let session = match state.sessions.get_mut(session_id) {
            Some(session) => {
                session.touch_at(now);
                session.clone()
            }
            None => {
                debug!(session_id, "Creating simulated session");
                let session = Session::simulated(session_id);
                state
                    .sessions
                    .insert(session_id.to_string(), session.clone());
                state.record_size();
                session
            }
        };
        session
    }

    /// Store a session as-is, refreshing its last-accessed time.
    pub fn set(&self, mut session: Session) {
        session.touch_at(Utc::now());
        let mut state = self.write();
        state.sessions.insert(session.id().to_string(), session);
        state.record_size();
    }

    /// Remove a session and its client. Idempotent.
    pub fn delete(&self, session_id: &str) {
        let mut state = self.write();
        state.sessions.remove(session_id);
        state.clients.remove(session_id);
        state.record_size();
    }

    /// Store an authenticated session and replace its client.
    ///
    /// Validating the viewer is the caller's job.
    pub fn login(&self, session_id: &str, token: &str, viewer: Viewer) -> Session {
        let client = (self.factory)(token);
        let session = Session::authenticated(session_id, token, viewer);

        let mut state = self.write();
        state
            .sessions
            .insert(session_id.to_string(), session.clone());
        state.clients.insert(session_id.to_string(), client);
        state.record_size();
        drop(state);

        info!(session_id, username = session.username().unwrap_or(""), "Session logged in");
        session
    }

    /// Demote a session to a guest and give it an unauthenticated client.
    pub fn logout(&self, session_id: &str) -> Session {
        let client = (self.factory)("");
        let session = Session::simulated(session_id);

        let mut state = self.write();
        state
            .sessions
            .insert(session_id.to_string(), session.clone());
        state.clients.insert(session_id.to_string(), client);
        state.record_size();
        drop(state);

        info!(session_id, "Session logged out");
        session
    }

    /// The session's client, built from its current token if absent.
    pub fn get_client(&self, session_id: &str) -> Arc<dyn PlatformClient> {
        let token = {
            let state = self.read();
            if let Some(client) = state.clients.get(session_id) {
                return Arc::clone(client);
            }
            state.token_of(session_id)
        };

        let client = (self.factory)(&token);

        // A concurrent login/logout may have installed a client meanwhile;
        // theirs reflects the newer token.
        let mut state = self.write();
        Arc::clone(
            state
                .clients
                .entry(session_id.to_string())
                .or_insert(client),
        )
    }

    /// Rebuild a session's client from its current token.
    ///
    /// If the token changes while the client is being built, the stale
    /// client is discarded and the build is retried with the new token.
    pub fn refresh_client(&self, session_id: &str) -> Arc<dyn PlatformClient> {
        let mut token = self.read().token_of(session_id);
        loop {
            let client = (self.factory)(&token);

            let mut state = self.write();
            let current = state.token_of(session_id);
            if current == token {
                state
                    .clients
                    .insert(session_id.to_string(), Arc::clone(&client));
                drop(state);
                debug!(session_id, "Refreshed platform client");
                return client;
            }
            drop(state);

            debug!(session_id, "Token changed during refresh, rebuilding client");
            token = current;
        }
    }


    /// Snapshot of every session.
    pub fn list_all(&self) -> Vec<Session> {
        self.read().sessions.values().cloned().collect()
    }

    /// Snapshot of the sessions logged in with a real token.
    pub fn list_authenticated(&self) -> Vec<Session> {
        self.read()
            .sessions
            .values()
            .filter(|s| s.is_authenticated())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict sessions idle past the retention window. Returns the count.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub(crate) fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        // A retention window reaching past the earliest representable time
        // never expires anything.
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            debug!("Retention window out of range, nothing to evict");
            return 0;
        };
        let mut state = self.write();

        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.last_accessed() >= cutoff);
        let evicted = before - state.sessions.len();

        let RegistryState { sessions, clients } = &mut *state;
        clients.retain(|id, _| sessions.contains_key(id));
        state.record_size();
        drop(state);

        if evicted > 0 {
            metrics::SESSIONS_EVICTED.inc_by(evicted as u64);
            info!(evicted, "Evicted idle sessions");
        }
        evicted
    }

    /// Start the periodic eviction task.
    pub fn start_sweeper(self: &Arc<Self>, interval: std::time::Duration) -> SessionSweeper {
        let sweeper = SessionSweeper::new(Arc::clone(self), interval);
        sweeper.start();
        sweeper
    }

    #[cfg(test)]
    fn backdate(&self, session_id: &str, at: DateTime<Utc>) {
        if let Some(session) = self.write().sessions.get_mut(session_id) {
            session.touch_at(at);
        }
    }
}
