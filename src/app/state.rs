//! Application state shared across routes

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::game::session::{GameSession, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    /// Session joined by connections that don't name one
    pub default_session: Uuid,
}

impl AppState {
    /// Create the state and start the default session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionRegistry::new());

        let (session, handle) = GameSession::new(Uuid::new_v4(), config.session.clone());
        let default_session = handle.id;
        sessions.insert(handle);
        tokio::spawn(session.run());

        Self {
            config,
            sessions,
            default_session,
        }
    }
}
