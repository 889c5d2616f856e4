//! Error types for the `doctalk-session` crate.

use doctalk_rag::RagError;
use thiserror::Error;

/// Errors that can occur while managing sessions or answering chat turns.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session with this id exists.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session was idle longer than the TTL and has been discarded.
    #[error("Session expired: {0}")]
    Expired(String),

    /// The session has no index yet, so there is nothing to search.
    #[error("No documents uploaded for session {0}")]
    NoDocuments(String),

    /// The answer synthesizer failed.
    #[error("Synthesis error ({synthesizer}): {message}")]
    Synthesis {
        /// The synthesizer that produced the error.
        synthesizer: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error from chunking, embedding or searching.
    #[error(transparent)]
    Rag(#[from] RagError),
}

impl SessionError {
    /// Shorthand for a [`SessionError::Synthesis`] raised by `synthesizer`.
    pub fn synthesis(synthesizer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Synthesis { synthesizer: synthesizer.into(), message: message.into() }
    }

    /// Whether the caller should treat this as a missing resource (404).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired(_))
    }
}

/// A convenience result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
