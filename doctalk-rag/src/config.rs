//! Configuration for chunking and retrieval.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Seed terms used by summary requests to sample broad coverage of every document.
pub const DEFAULT_SUMMARY_SEEDS: [&str; 7] =
    ["", "introduction", "conclusion", "main", "important", "key", "overview"];

/// Configuration parameters for chunking and context retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results requested from the index for a regular question.
    pub top_k: usize,
    /// Passages kept per source for a regular question.
    pub per_source_cap: usize,
    /// Upper bound on the passages handed to the synthesizer for a regular question.
    pub max_context: usize,
    /// Seed queries for summary requests.
    pub summary_seeds: Vec<String>,
    /// Number of results requested per summary seed.
    pub summary_seed_k: usize,
    /// Passages kept per source for a summary request.
    pub summary_per_source_cap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            top_k: 15,
            per_source_cap: 3,
            max_context: 12,
            summary_seeds: DEFAULT_SUMMARY_SEEDS.iter().map(|s| s.to_string()).collect(),
            summary_seed_k: 20,
            summary_per_source_cap: 8,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results requested for a regular question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set how many passages a single source may contribute to a regular answer.
    pub fn per_source_cap(mut self, cap: usize) -> Self {
        self.config.per_source_cap = cap;
        self
    }

    /// Set the total number of passages handed to the synthesizer.
    pub fn max_context(mut self, max: usize) -> Self {
        self.config.max_context = max;
        self
    }

    /// Replace the seed queries used for summary requests.
    pub fn summary_seeds<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.summary_seeds = seeds.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of results requested per summary seed.
    pub fn summary_seed_k(mut self, k: usize) -> Self {
        self.config.summary_seed_k = k;
        self
    }

    /// Set how many passages a single source contributes to a summary.
    pub fn summary_per_source_cap(mut self, cap: usize) -> Self {
        self.config.summary_per_source_cap = cap;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `per_source_cap`, `max_context`, `summary_seed_k` or
    ///   `summary_per_source_cap` is zero
    /// - `summary_seeds` is empty
    pub fn build(self) -> Result<RagConfig> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        for (name, value) in [
            ("top_k", c.top_k),
            ("per_source_cap", c.per_source_cap),
            ("max_context", c.max_context),
            ("summary_seed_k", c.summary_seed_k),
            ("summary_per_source_cap", c.summary_per_source_cap),
        ] {
            if value == 0 {
                return Err(RagError::Config(format!("{name} must be greater than zero")));
            }
        }
        if c.summary_seeds.is_empty() {
            return Err(RagError::Config("summary_seeds must not be empty".to_string()));
        }
        Ok(self.config)
    }
}
