//! A single chat session: its index, its documents and its conversation.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use doctalk_rag::RetrievalIndex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One question and its answer. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The user's message.
    pub user_text: String,
    /// The synthesized answer.
    pub assistant_text: String,
    /// Source ids the answer drew on.
    pub sources: BTreeSet<String>,
}

impl Turn {
    /// Create a turn.
    pub fn new(
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
        sources: BTreeSet<String>,
    ) -> Self {
        Self { user_text: user_text.into(), assistant_text: assistant_text.into(), sources }
    }
}

/// Read-only copy of a session, used for transcript export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: String,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the last successful lookup through the store.
    pub last_accessed_at: DateTime<Utc>,
    /// Whether an index has been attached.
    pub ready: bool,
    /// Names of the documents behind the current index, in upload order.
    pub document_names: Vec<String>,
    /// The full conversation, oldest first.
    pub history: Vec<Turn>,
}

#[derive(Debug, Default)]
struct SessionState {
    index: Option<Arc<RetrievalIndex>>,
    document_names: Vec<String>,
    history: Vec<Turn>,
}

/// A chat session owned by the [`SessionStore`](crate::SessionStore).
///
/// Handles are shared (`Arc<Session>`); the mutable parts sit behind a
/// `RwLock` that is never held across an embedding or synthesis call.
///
/// Idle expiry is decided by the store on a monotonic clock;
/// `last_accessed_at` mirrors it in wall-clock time for export.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_accessed_at: Mutex<DateTime<Utc>>,
    state: RwLock<SessionState>,
}

impl Session {
    pub(crate) fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_accessed_at: Mutex::new(now),
            state: RwLock::new(SessionState::default()),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_accessed_at.lock().unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wall-clock time of the last successful lookup through the store.
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        *self.last_accessed_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current index, if documents have been uploaded.
    pub async fn index(&self) -> Option<Arc<RetrievalIndex>> {
        self.state.read().await.index.clone()
    }

    /// Whether an index has been attached.
    pub async fn is_ready(&self) -> bool {
        self.state.read().await.index.is_some()
    }

    /// Names of the documents behind the current index.
    pub async fn document_names(&self) -> Vec<String> {
        self.state.read().await.document_names.clone()
    }

    /// Replace the index and its document list in one step.
    ///
    /// The previous index is dropped, never merged. Searches already running
    /// against it finish on their own `Arc`.
    pub async fn attach_index(&self, index: RetrievalIndex, document_names: Vec<String>) {
        let mut state = self.state.write().await;
        state.index = Some(Arc::new(index));
        state.document_names = document_names;
    }

    /// Record a completed turn.
    pub async fn append_turn(&self, turn: Turn) {
        self.state.write().await.history.push(turn);
    }

    /// The full conversation, oldest first.
    pub async fn history(&self) -> Vec<Turn> {
        self.state.read().await.history.clone()
    }

    /// The last `window` turns, oldest first.
    pub async fn recent_history(&self, window: usize) -> Vec<Turn> {
        let state = self.state.read().await;
        let start = state.history.len().saturating_sub(window);
        state.history[start..].to_vec()
    }

    /// Copy the session's current state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at(),
            ready: state.index.is_some(),
            document_names: state.document_names.clone(),
            history: state.history.clone(),
        }
    }
}
