//! Process-wide session registry with idle-time eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session::Session;

#[derive(Debug)]
struct Entry {
    session: Arc<Session>,
    last_accessed: Instant,
}

/// Maps session ids to [`Session`]s and evicts sessions idle past the TTL.
///
/// Cloning is cheap and every clone shares the same map, so one store is
/// created at startup and handed to each request handler. Expired sessions
/// are removed lazily: by [`get`](Self::get) when it finds one, and by the
/// sweep that runs on every [`create`](Self::create). There is no background
/// timer.
///
/// Idle time is measured with [`tokio::time::Instant`], which follows the
/// paused clock in tests.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default().ttl)
    }
}

impl SessionStore {
    /// Create an empty store evicting sessions idle for longer than `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Create an empty store from a [`SessionConfig`].
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.ttl)
    }

    /// The idle time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a new empty session and sweep expired ones.
    pub async fn create(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = Instant::now();

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_id.clone(),
            Entry { session: Arc::new(Session::new(session_id.clone())), last_accessed: now },
        );
        let evicted = Self::evict_expired(&mut sessions, now, self.ttl);

        info!(session.id = %session_id, evicted, active = sessions.len(), "session created");
        session_id
    }

    /// Look up a session and mark it as accessed.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] if no such session exists.
    /// - [`SessionError::Expired`] if it was idle past the TTL; it is removed.
    pub async fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        if now.duration_since(entry.last_accessed) > self.ttl {
            sessions.remove(session_id);
            info!(session.id = %session_id, "session expired");
            return Err(SessionError::Expired(session_id.to_string()));
        }

        entry.last_accessed = now;
        entry.session.touch();
        Ok(Arc::clone(&entry.session))
    }

    /// Remove a session. Unknown ids are ignored.
    pub async fn delete(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            info!(session.id = %session_id, "session deleted");
        }
    }

    /// Whether a live entry exists for `session_id`.
    ///
    /// Does not count as an access and does not evict.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Evict every expired session now. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        Self::evict_expired(&mut sessions, Instant::now(), self.ttl)
    }

    fn evict_expired(sessions: &mut HashMap<String, Entry>, now: Instant, ttl: Duration) -> usize {
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = now.duration_since(entry.last_accessed) <= ttl;
            if !keep {
                debug!(session.id = %id, "evicting expired session");
            }
            keep
        });
        before - sessions.len()
    }
}
