//! Session manager interface and an in-memory implementation.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque session identifier handed to the client (as a cookie)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub trait SessionManager: Send + Sync {
    fn create_session(&self, authenticated: bool) -> SessionToken;
    fn invalidate_all_sessions(&self);
}

#[derive(Debug, Clone)]
struct Session {
    authenticated: bool,
    last_access: Instant,
}

#[derive(Debug, Default)]
pub struct InMemorySessionManager {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop every session not used within `timeout`. Returns how many were
    /// removed.
    pub fn prune_idle(&self, timeout: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_access.elapsed() <= timeout);
        before.saturating_sub(self.sessions.len())
    }
}

impl SessionManager for InMemorySessionManager {
    fn create_session(&self, authenticated: bool) -> SessionToken {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                authenticated,
                last_access: Instant::now(),
            },
        );
        tracing::debug!(authenticated, "session created");
        SessionToken(token)
    }

    fn invalidate_all_sessions(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        tracing::info!(count, "all sessions invalidated");
    }
}
