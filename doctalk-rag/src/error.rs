//! Error types for the `doctalk-rag` crate.

use thiserror::Error;

/// Errors that can occur while building or querying a retrieval index.
#[derive(Debug, Error)]
pub enum RagError {
    /// The upload batch produced no chunks, so there is nothing to search.
    #[error("No extractable text: the document batch produced no chunks")]
    EmptyIndex,

    /// The embedding model was unavailable or returned an unusable response.
    ///
    /// Fatal for the current upload or query; never retried.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A query vector does not have the dimension of the indexed vectors.
    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// Dimension of the vectors stored in the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// A configuration or argument validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Shorthand for an [`RagError::Embedding`] raised by `provider`.
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
