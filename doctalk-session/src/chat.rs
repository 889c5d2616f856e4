//! Chat orchestration over the session store.
//!
//! [`DocChat`] is the service an outer surface (the CLI, an HTTP layer)
//! talks to. It composes a [`SessionStore`], a [`Chunker`], an
//! [`EmbeddingProvider`] and an [`AnswerSynthesizer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use doctalk_rag::{Document, HashingEmbedder};
//! use doctalk_session::{DocChat, ExtractiveSynthesizer};
//!
//! let chat = DocChat::builder()
//!     .embedder(Arc::new(HashingEmbedder::default()))
//!     .synthesizer(Arc::new(ExtractiveSynthesizer::new()))
//!     .build()?;
//!
//! let receipt = chat.upload(vec![Document::new("notes.txt", text)]).await?;
//! let reply = chat.chat(&receipt.session_id, "What is this about?").await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use doctalk_rag::{
    Chunker, Document, EmbeddingProvider, RagConfig, RecursiveChunker, RetrievalIndex,
    RetrievalMode, retrieve_context,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session::{SessionSnapshot, Turn};
use crate::store::SessionStore;
use crate::synthesizer::{AnswerSynthesizer, ContextPassage, SynthesisRequest};

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// The session the documents were attached to.
    pub session_id: String,
    /// Distinct document ids, in upload order.
    pub processed_files: Vec<String>,
    /// Number of chunks in the new index.
    pub chunk_count: usize,
}

/// The answer to one chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Answer text.
    pub answer: String,
    /// Cited source ids, sorted.
    pub sources: Vec<String>,
    /// How the context was gathered.
    pub mode: RetrievalMode,
}

/// The chat service. Construct one via [`DocChat::builder()`].
pub struct DocChat {
    store: SessionStore,
    session_config: SessionConfig,
    rag_config: RagConfig,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
}

impl DocChat {
    /// Create a new [`DocChatBuilder`].
    pub fn builder() -> DocChatBuilder {
        DocChatBuilder::default()
    }

    /// The underlying session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The retrieval configuration.
    pub fn rag_config(&self) -> &RagConfig {
        &self.rag_config
    }

    /// The session configuration.
    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Index `documents` in a new session.
    ///
    /// The index is built before the session is registered, so a failed
    /// upload leaves no session behind.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rag`] if the batch has no text or embedding fails.
    pub async fn upload(&self, documents: Vec<Document>) -> Result<UploadReceipt> {
        let index = self.build_index(&documents).await?;
        let session_id = self.store.create().await;
        let session = self.store.get(&session_id).await?;

        let receipt = Self::receipt(&session_id, &documents, &index);
        session.attach_index(index, receipt.processed_files.clone()).await;

        info!(
            session.id = %session_id,
            file_count = receipt.processed_files.len(),
            chunk_count = receipt.chunk_count,
            "documents uploaded"
        );
        Ok(receipt)
    }

    /// Replace the index of an existing session with one built from `documents`.
    ///
    /// The conversation is kept. If indexing fails, the previous index stays
    /// in place. The session is looked up again once the index is built, so a
    /// session deleted or expired in the meantime is reported rather than
    /// silently updated.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::Expired`] for an
    /// unknown session, and [`SessionError::Rag`] if indexing fails.
    pub async fn reupload(&self, session_id: &str, documents: Vec<Document>) -> Result<UploadReceipt> {
        let session = self.store.get(session_id).await?;
        let index = self.build_index(&documents).await?;

        let current = self.store.get(session_id).await.map_err(|e| {
            error!(session.id = %session_id, error = %e, "session vanished while indexing");
            e
        })?;
        if !Arc::ptr_eq(&current, &session) {
            error!(session.id = %session_id, "session replaced while indexing");
            return Err(SessionError::NotFound(session_id.to_string()));
        }

        let receipt = Self::receipt(session_id, &documents, &index);
        session.attach_index(index, receipt.processed_files.clone()).await;

        info!(
            session.id = %session_id,
            file_count = receipt.processed_files.len(),
            chunk_count = receipt.chunk_count,
            "documents replaced"
        );
        Ok(receipt)
    }

    /// Answer `message` from the session's documents and record the turn.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotFound`] / [`SessionError::Expired`] for an unknown session.
    /// - [`SessionError::NoDocuments`] if nothing has been uploaded.
    /// - [`SessionError::Rag`] if the query cannot be embedded.
    /// - [`SessionError::Synthesis`] if the synthesizer fails; no turn is recorded.
    pub async fn chat(&self, session_id: &str, message: &str) -> Result<ChatReply> {
        let session = self.store.get(session_id).await?;
        let index =
            session.index().await.ok_or_else(|| SessionError::NoDocuments(session_id.to_string()))?;

        let (mode, hits) = retrieve_context(&index, message, &self.rag_config).await.map_err(|e| {
            error!(session.id = %session_id, error = %e, "retrieval failed");
            SessionError::from(e)
        })?;
        let context: Vec<ContextPassage> = hits.into_iter().map(ContextPassage::from).collect();
        let history = session.recent_history(self.session_config.history_window).await;

        let synthesis = self
            .synthesizer
            .synthesize(SynthesisRequest { query: message, mode, context: &context, history: &history })
            .await
            .map_err(|e| {
                error!(
                    session.id = %session_id,
                    synthesizer = self.synthesizer.name(),
                    error = %e,
                    "synthesis failed"
                );
                e
            })?;

        let sources: Vec<String> = synthesis.sources.iter().cloned().collect();
        session.append_turn(Turn::new(message, synthesis.answer.clone(), synthesis.sources)).await;

        info!(
            session.id = %session_id,
            mode = ?mode,
            context_len = context.len(),
            source_count = sources.len(),
            "chat turn completed"
        );
        Ok(ChatReply { answer: synthesis.answer, sources, mode })
    }

    /// Copy a session's state for export.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::Expired`] for an unknown session.
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot> {
        let session = self.store.get(session_id).await?;
        Ok(session.snapshot().await)
    }

    /// Discard a session. Unknown ids are ignored.
    pub async fn end_session(&self, session_id: &str) {
        self.store.delete(session_id).await;
    }

    async fn build_index(&self, documents: &[Document]) -> Result<RetrievalIndex> {
        RetrievalIndex::build(documents, self.chunker.as_ref(), Arc::clone(&self.embedder))
            .await
            .map_err(|e| {
                error!(document_count = documents.len(), error = %e, "indexing failed");
                SessionError::from(e)
            })
    }

    fn receipt(session_id: &str, documents: &[Document], index: &RetrievalIndex) -> UploadReceipt {
        let mut seen = HashSet::new();
        let processed_files = documents
            .iter()
            .filter(|document| seen.insert(document.id.as_str()))
            .map(|document| document.id.clone())
            .collect();
        UploadReceipt { session_id: session_id.to_string(), processed_files, chunk_count: index.len() }
    }
}

/// Builder for constructing a [`DocChat`].
///
/// `embedder` and `synthesizer` are required. The store defaults to one
/// built from the session config, and the chunker to a
/// [`RecursiveChunker`] sized by the retrieval config.
#[derive(Default)]
pub struct DocChatBuilder {
    store: Option<SessionStore>,
    session_config: Option<SessionConfig>,
    rag_config: Option<RagConfig>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    synthesizer: Option<Arc<dyn AnswerSynthesizer>>,
}

impl DocChatBuilder {
    /// Share an existing session store.
    pub fn store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = Some(config);
        self
    }

    /// Set the retrieval configuration.
    pub fn rag_config(mut self, config: RagConfig) -> Self {
        self.rag_config = Some(config);
        self
    }

    /// Set the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the answer synthesizer.
    pub fn synthesizer(mut self, synthesizer: Arc<dyn AnswerSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Build the [`DocChat`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the embedder or synthesizer is missing.
    pub fn build(self) -> Result<DocChat> {
        let embedder = self
            .embedder
            .ok_or_else(|| SessionError::Config("embedder is required".to_string()))?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| SessionError::Config("synthesizer is required".to_string()))?;

        let session_config = self.session_config.unwrap_or_default();
        let rag_config = self.rag_config.unwrap_or_default();
        let store = self.store.unwrap_or_else(|| SessionStore::from_config(&session_config));
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&rag_config)));

        Ok(DocChat { store, session_config, rag_config, chunker, embedder, synthesizer })
    }
}
