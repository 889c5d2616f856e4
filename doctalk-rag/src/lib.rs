//! # doctalk-rag
//!
//! The retrieval engine behind DocTalk sessions: uploaded text is chunked,
//! embedded in one batch and kept in an immutable in-memory
//! [`RetrievalIndex`] that answers diversity-aware top-k queries.
//!
//! ## Overview
//!
//! - [`Chunker`] — splits text into overlapping segments ([`RecursiveChunker`], [`FixedSizeChunker`])
//! - [`EmbeddingProvider`] — maps text to vectors ([`HashingEmbedder`], `OpenAIEmbeddingProvider`, `OnnxEmbeddingProvider`)
//! - [`RetrievalIndex`] — builds from an upload batch and searches it
//! - [`strategy`] — summary and question retrieval policies on top of the index
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use doctalk_rag::{Document, HashingEmbedder, RagConfig, RecursiveChunker, RetrievalIndex};
//!
//! let config = RagConfig::default();
//! let chunker = RecursiveChunker::from_config(&config);
//! let docs = vec![Document::new("a.txt", "Paris is the capital of France.")];
//! let index = RetrievalIndex::build(&docs, &chunker, Arc::new(HashingEmbedder::default())).await?;
//! let hits = index.search("capital of France", 3).await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI-compatible embedding provider over `reqwest` |
//! | `onnx` | Local sentence-transformer embeddings via ONNX Runtime (`ort`, `tokenizers`) |
//! | `full` | All of the above |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod index;
pub mod strategy;

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, TextSegment};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, ScoredChunk};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use hashing::HashingEmbedder;
pub use index::RetrievalIndex;
pub use strategy::{
    RetrievalMode, broad_coverage_search, broad_coverage_search_with, focused_search,
    retrieve_context,
};

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbeddingProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
