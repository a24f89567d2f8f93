use std::sync::Arc;

use crate::config::Config;
use crate::oracle::RewriteOracle;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable rewrite backend. Production: `GeminiClient`.
    pub oracle: Arc<dyn RewriteOracle>,
    pub config: Config,
    /// In-memory paragraph sessions. Lost on restart.
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, oracle: Arc<dyn RewriteOracle>) -> Self {
        Self {
            oracle,
            config,
            sessions: SessionStore::default(),
        }
    }
}
