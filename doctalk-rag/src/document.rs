//! Data types for uploaded documents, chunks, and scored search results.

use serde::{Deserialize, Serialize};

/// One entry of an upload batch: the extracted text of a single source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Source identifier, usually the uploaded file name.
    pub id: String,
    /// The full extracted text.
    pub text: String,
}

impl Document {
    /// Create a document from a source id and its text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// A contiguous slice of one document, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// The [`Document::id`] this chunk was cut from.
    pub source_id: String,
    /// 0-based position within the source's chunk sequence.
    pub chunk_index: usize,
}

/// A retrieved [`Chunk`] paired with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

impl ScoredChunk {
    /// The chunk's text.
    pub fn text(&self) -> &str {
        &self.chunk.text
    }

    /// The chunk's source id.
    pub fn source_id(&self) -> &str {
        &self.chunk.source_id
    }
}
