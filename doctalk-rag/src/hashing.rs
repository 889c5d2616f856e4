//! Deterministic feature-hashing embedder.
//!
//! [`HashingEmbedder`] needs no model download or network access. Each text is
//! lower-cased and split into alphanumeric word tokens; every token and every
//! adjacent token pair is hashed with SHA-256 into a signed bucket of a
//! fixed-size vector, which is then L2-normalized. Texts sharing vocabulary
//! end up with high cosine similarity, which is enough for offline use and
//! reproducible tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Dimension of the hosted sentence-transformer model this stands in for.
pub const DEFAULT_DIMENSIONS: usize = 384;

const BIGRAM_WEIGHT: f32 = 0.5;

/// An [`EmbeddingProvider`] that hashes word features into a dense vector.
///
/// Output vectors are unit length, except for text without any word token
/// (such as `""`), which maps to the zero vector.
///
/// # Example
///
/// ```rust,ignore
/// use doctalk_rag::HashingEmbedder;
///
/// let embedder = HashingEmbedder::new(256)?;
/// let v = embedder.embed("Paris is the capital of France.").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: DEFAULT_DIMENSIONS }
    }
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-long vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::Config("embedding dimensions must be greater than zero".into()));
        }
        Ok(Self { dimensions })
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> =
            lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();

        let mut vector = vec![0.0f32; self.dimensions];
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!(provider = "Hashing", batch_size = texts.len(), "embedding batch");
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Hashing"
    }
}
