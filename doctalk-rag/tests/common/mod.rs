//! Test doubles shared by the `doctalk-rag` integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use doctalk_rag::chunking::{Chunker, TextSegment};
use doctalk_rag::embedding::EmbeddingProvider;
use doctalk_rag::error::{RagError, Result};

/// Treats every line of a document as one chunk.
pub struct LineChunker;

impl Chunker for LineChunker {
    fn split(&self, text: &str) -> Vec<TextSegment> {
        let mut segments = Vec::new();
        let mut offset = 0;
        for line in text.split('\n') {
            let len = line.chars().count();
            if len > 0 {
                segments.push(TextSegment {
                    text: line.to_string(),
                    start: offset,
                    end: offset + len,
                });
            }
            offset += len + 1;
        }
        segments
    }
}

/// Parses text of the form `"0.5,-1,0.25"` into the vector it spells out.
pub struct LiteralEmbedder {
    pub dimensions: usize,
}

impl LiteralEmbedder {
    pub fn encode(vector: &[f32]) -> String {
        vector.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
    }
}

#[async_trait]
impl EmbeddingProvider for LiteralEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        text.split(',')
            .map(|part| {
                part.trim()
                    .parse::<f32>()
                    .map_err(|e| RagError::embedding("Literal", format!("bad literal {part:?}: {e}")))
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Literal"
    }
}

/// Always fails, as an unreachable model would.
pub struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::embedding("Unavailable", "model not loaded"))
    }

    fn dimensions(&self) -> usize {
        8
    }
}

/// Drops the last vector of every batch.
pub struct ShortBatchEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortBatchEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
    }

    fn dimensions(&self) -> usize {
        2
    }
}
