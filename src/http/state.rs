use crate::session::{CoachingSession, SessionServices};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (session_id → handle)
    pub sessions: Arc<RwLock<HashMap<String, CoachingSession>>>,

    pub services: Arc<SessionServices>,
}

impl AppState {
    pub fn new(services: Arc<SessionServices>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            services,
        }
    }

    pub async fn session(&self, id: &str) -> Option<CoachingSession> {
        self.sessions.read().await.get(id).cloned()
    }
}
