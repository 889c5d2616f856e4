//! Test doubles shared by the `doctalk-session` integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use doctalk_rag::{EmbeddingProvider, HashingEmbedder, RagError};
use doctalk_session::{
    AnswerSynthesizer, ContextPassage, DocChat, ExtractiveSynthesizer, Result, SessionError,
    Synthesis, SynthesisRequest, Turn, cited_sources,
};

/// What a [`RecordingSynthesizer`] was called with.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub query: String,
    pub context: Vec<ContextPassage>,
    pub history: Vec<Turn>,
}

/// Answers `"answer N"` and remembers every request.
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingSynthesizer {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerSynthesizer for RecordingSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Synthesis> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(RecordedCall {
            query: request.query.to_string(),
            context: request.context.to_vec(),
            history: request.history.to_vec(),
        });
        Ok(Synthesis {
            answer: format!("answer {}", calls.len()),
            sources: cited_sources(request.context),
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Always fails, as an unreachable model would.
pub struct FailingSynthesizer;

#[async_trait]
impl AnswerSynthesizer for FailingSynthesizer {
    async fn synthesize(&self, _request: SynthesisRequest<'_>) -> Result<Synthesis> {
        Err(SessionError::synthesis("failing", "model unavailable"))
    }
}

/// Always fails to embed.
pub struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> doctalk_rag::Result<Vec<f32>> {
        Err(RagError::embedding("Unavailable", "model not loaded"))
    }

    fn dimensions(&self) -> usize {
        8
    }
}

/// A chat service over the hashing embedder and the extractive synthesizer.
pub fn extractive_chat() -> DocChat {
    DocChat::builder()
        .embedder(Arc::new(HashingEmbedder::default()))
        .synthesizer(Arc::new(ExtractiveSynthesizer::new()))
        .build()
        .unwrap()
}
