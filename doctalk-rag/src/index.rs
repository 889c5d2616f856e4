//! In-memory retrieval index with diversity-aware search.
//!
//! This module provides [`RetrievalIndex`], the per-session store of chunk
//! vectors. An index is built once from an upload batch and never mutated;
//! a re-upload builds a new index that replaces the old one wholesale.
//!
//! Search is a brute-force scan scored by cosine similarity. Stored vectors
//! are L2-normalized once at build time and the query at search time, so the
//! score is a plain dot product regardless of whether the embedding provider
//! normalizes its output.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::chunking::Chunker;
use crate::document::{Chunk, Document, ScoredChunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The chunks of one upload batch and their embeddings.
///
/// `chunks[i]` and `vectors[i]` always describe the same chunk. The
/// embedding provider used to build the index is kept so that queries are
/// embedded into the same vector space.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use doctalk_rag::{Document, HashingEmbedder, RecursiveChunker, RetrievalIndex};
///
/// let docs = vec![Document::new("a.txt", "Paris is the capital of France.")];
/// let chunker = RecursiveChunker::new(512, 50)?;
/// let index = RetrievalIndex::build(&docs, &chunker, Arc::new(HashingEmbedder::default())).await?;
/// let hits = index.search("capital of France", 1).await?;
/// assert_eq!(hits[0].chunk.source_id, "a.txt");
/// ```
pub struct RetrievalIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl fmt::Debug for RetrievalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalIndex")
            .field("chunks", &self.chunks.len())
            .field("dimensions", &self.dimensions)
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

/// Scale `v` to unit length. The zero vector is returned unchanged.
///
/// The norm is accumulated in `f64`; squaring large `f32` components would
/// overflow to infinity.
fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|&x| (f64::from(x) / norm) as f32).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Resolve a batch to mapping semantics: one entry per id, positioned where
/// the id first appeared, holding the text of its last occurrence.
fn unique_sources(documents: &[Document]) -> Vec<&Document> {
    let mut sources: Vec<&Document> = Vec::with_capacity(documents.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for document in documents {
        match positions.get(document.id.as_str()) {
            Some(&i) => sources[i] = document,
            None => {
                positions.insert(document.id.as_str(), sources.len());
                sources.push(document);
            }
        }
    }
    sources
}

impl RetrievalIndex {
    /// Build an index from an upload batch: chunk → embed (one batch call) → store.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyIndex`] if the batch yields no chunks, including an
    ///   empty batch.
    /// - [`RagError::Embedding`] if the provider fails or returns the wrong
    ///   number of vectors, or vectors of inconsistent dimension.
    pub async fn build(
        documents: &[Document],
        chunker: &dyn Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let sources = unique_sources(documents);
        let chunks: Vec<Chunk> =
            sources.iter().flat_map(|doc| chunker.chunk(&doc.id, &doc.text)).collect();

        if chunks.is_empty() {
            info!(source_count = sources.len(), "upload batch produced no chunks");
            return Err(RagError::EmptyIndex);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let raw = embedder.embed_batch(&texts).await.map_err(|e| {
            error!(provider = embedder.name(), error = %e, "embedding failed while building index");
            e
        })?;

        if raw.len() != chunks.len() {
            return Err(RagError::embedding(
                embedder.name(),
                format!("expected {} embeddings, got {}", chunks.len(), raw.len()),
            ));
        }

        let dimensions = raw[0].len();
        if let Some(bad) = raw.iter().find(|v| v.len() != dimensions || v.is_empty()) {
            return Err(RagError::embedding(
                embedder.name(),
                format!("inconsistent embedding dimensions: {} and {}", dimensions, bad.len()),
            ));
        }
        if raw.iter().flatten().any(|x| !x.is_finite()) {
            return Err(RagError::embedding(embedder.name(), "embedding contains NaN or infinity"));
        }

        let vectors = raw.iter().map(|v| normalized(v)).collect();

        info!(
            chunk_count = chunks.len(),
            source_count = sources.len(),
            dimensions,
            provider = embedder.name(),
            "retrieval index built"
        );

        Ok(Self { chunks, vectors, dimensions, embedder })
    }

    /// Create an index without chunks. Every search on it returns no results.
    pub fn empty(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let dimensions = embedder.dimensions();
        Self { chunks: Vec::new(), vectors: Vec::new(), dimensions, embedder }
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Dimension of the indexed vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// All chunks in index order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Distinct source ids in index order.
    pub fn source_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.chunks
            .iter()
            .map(|c| c.source_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// The provider queries are embedded with.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed `query` and return up to `k` diversity-aware results.
    ///
    /// See [`search_by_vector`](Self::search_by_vector) for the selection
    /// rules. An index without chunks returns an empty `Vec` without calling
    /// the embedding provider.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if `k == 0`.
    /// - [`RagError::Embedding`] if the query cannot be embedded.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(RagError::Config("k must be greater than zero".to_string()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(provider = self.embedder.name(), error = %e, "query embedding failed");
            e
        })?;
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(RagError::embedding(
                self.embedder.name(),
                "query embedding contains NaN or infinity",
            ));
        }
        self.search_by_vector(&embedding, k)
    }

    /// Return up to `k` results for a precomputed query vector.
    ///
    /// 1. Every chunk is scored by cosine similarity and ranked by descending
    ///    score; ties go to the smaller `chunk_index`, then the smaller
    ///    `source_id`.
    /// 2. Diversity pass: walking the ranking, the best chunk of each source is
    ///    taken until `k` results are selected or every source is represented.
    /// 3. Fill pass: remaining slots are filled from the top of the ranking,
    ///    skipping chunks already selected.
    /// 4. The selection is returned in ranking order, so scores never increase
    ///    along the result.
    ///
    /// With at least `k` distinct sources the result therefore spans `k`
    /// sources.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if `k == 0`.
    /// - [`RagError::DimensionMismatch`] if `query` has the wrong length.
    /// - [`RagError::Config`] if `query` holds a non-finite value.
    pub fn search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(RagError::Config("k must be greater than zero".to_string()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(RagError::Config("query vector contains NaN or infinity".to_string()));
        }

        let query = normalized(query);
        let mut ranking: Vec<(usize, f32)> =
            self.vectors.iter().enumerate().map(|(pos, v)| (pos, dot(v, &query))).collect();
        ranking.sort_by(|a, b| self.rank_order(a, b));

        let mut taken = vec![false; ranking.len()];
        let mut selected: Vec<usize> = Vec::with_capacity(k.min(ranking.len()));
        let mut sources_seen: HashSet<&str> = HashSet::new();

        for (rank, (pos, _)) in ranking.iter().enumerate() {
            if selected.len() == k {
                break;
            }
            if sources_seen.insert(self.chunks[*pos].source_id.as_str()) {
                taken[rank] = true;
                selected.push(rank);
            }
        }

        for rank in 0..ranking.len() {
            if selected.len() == k {
                break;
            }
            if !taken[rank] {
                taken[rank] = true;
                selected.push(rank);
            }
        }

        // Rank positions are ordered by score with the tie-break applied, so
        // sorting them restores score order across both passes.
        selected.sort_unstable();

        let results: Vec<ScoredChunk> = selected
            .into_iter()
            .map(|rank| {
                let (pos, score) = ranking[rank];
                ScoredChunk { chunk: self.chunks[pos].clone(), score }
            })
            .collect();

        debug!(
            k,
            result_count = results.len(),
            source_count = sources_seen.len(),
            "index search completed"
        );

        Ok(results)
    }

    /// Descending score; ties by `chunk_index`, then `source_id`, then position.
    fn rank_order(&self, a: &(usize, f32), b: &(usize, f32)) -> Ordering {
        let (chunk_a, chunk_b) = (&self.chunks[a.0], &self.chunks[b.0]);
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| chunk_a.chunk_index.cmp(&chunk_b.chunk_index))
            .then_with(|| chunk_a.source_id.cmp(&chunk_b.source_id))
            .then_with(|| a.0.cmp(&b.0))
    }
}
