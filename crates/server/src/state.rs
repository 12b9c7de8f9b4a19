use std::sync::Arc;

use tsundoku_core::{
    AcquisitionService, Config, PreMatchStore, SanitizedConfig, SessionRegistry, StatusAggregator,
};

/// Shared application state
///
/// Everything a request-handling layer needs to serve one session.
pub struct AppState {
    config: Config,
    sessions: Arc<SessionRegistry>,
    acquisition: Arc<AcquisitionService>,
    status: Arc<StatusAggregator>,
    prematch: Arc<dyn PreMatchStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        sessions: Arc<SessionRegistry>,
        acquisition: Arc<AcquisitionService>,
        status: Arc<StatusAggregator>,
        prematch: Arc<dyn PreMatchStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            acquisition,
            status,
            prematch,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn acquisition(&self) -> &Arc<AcquisitionService> {
        &self.acquisition
    }

    pub fn status(&self) -> &Arc<StatusAggregator> {
        &self.status
    }

    pub fn prematch(&self) -> &dyn PreMatchStore {
        self.prematch.as_ref()
    }
}
