//! The answer synthesizer seam and a local, model-free implementation.

use std::collections::BTreeSet;

use async_trait::async_trait;
use doctalk_rag::{RetrievalMode, ScoredChunk};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::Turn;

/// Reply used when retrieval found nothing to answer from.
pub const NO_INFORMATION_REPLY: &str =
    "I don't have information about that in the uploaded documents.";

/// Characters of a passage quoted by [`ExtractiveSynthesizer`].
const DEFAULT_SNIPPET_CHARS: usize = 280;

/// Passages quoted per question by [`ExtractiveSynthesizer`].
const DEFAULT_MAX_PASSAGES: usize = 3;

/// A retrieved passage as the synthesizer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPassage {
    /// Passage text.
    pub text: String,
    /// The document it came from.
    pub source_id: String,
}

impl ContextPassage {
    /// Create a passage.
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self { text: text.into(), source_id: source_id.into() }
    }
}

impl From<ScoredChunk> for ContextPassage {
    fn from(hit: ScoredChunk) -> Self {
        Self { text: hit.chunk.text, source_id: hit.chunk.source_id }
    }
}

/// Everything a synthesizer gets for one chat turn.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// The user's message.
    pub query: &'a str,
    /// How the context was gathered.
    pub mode: RetrievalMode,
    /// Retrieved passages, most relevant first within each source.
    pub context: &'a [ContextPassage],
    /// The most recent turns, oldest first.
    pub history: &'a [Turn],
}

/// A synthesized answer and the sources it cites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    /// Answer text.
    pub answer: String,
    /// Source ids the answer drew on.
    pub sources: BTreeSet<String>,
}

/// Turns a question, retrieved context and recent history into an answer.
///
/// Implementations may call a remote language model. They run without any
/// session lock held.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Produce an answer for `request`.
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Synthesis>;

    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        "synthesizer"
    }
}

/// The distinct source ids of `context`.
pub fn cited_sources(context: &[ContextPassage]) -> BTreeSet<String> {
    context.iter().map(|passage| passage.source_id.clone()).collect()
}

/// Answers by quoting retrieved passages, without a language model.
///
/// Questions get the leading passages quoted with their source names.
/// Summary requests get one section per source built from its passages.
/// Used by the CLI when no model is configured, and in tests.
#[derive(Debug, Clone)]
pub struct ExtractiveSynthesizer {
    snippet_chars: usize,
    max_passages: usize,
}

impl Default for ExtractiveSynthesizer {
    fn default() -> Self {
        Self { snippet_chars: DEFAULT_SNIPPET_CHARS, max_passages: DEFAULT_MAX_PASSAGES }
    }
}

impl ExtractiveSynthesizer {
    /// Create a synthesizer with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many characters of each passage are quoted.
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars.max(1);
        self
    }

    /// Set how many passages a question answer quotes.
    pub fn with_max_passages(mut self, passages: usize) -> Self {
        self.max_passages = passages.max(1);
        self
    }

    fn answer_question(&self, context: &[ContextPassage]) -> (String, BTreeSet<String>) {
        let quoted = &context[..context.len().min(self.max_passages)];
        let answer = quoted
            .iter()
            .map(|passage| {
                format!("According to {}, {}", passage.source_id, self.snippet(&passage.text))
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        (answer, cited_sources(quoted))
    }

    fn answer_summary(&self, context: &[ContextPassage]) -> (String, BTreeSet<String>) {
        let mut sections: Vec<(&str, Vec<&ContextPassage>)> = Vec::new();
        for passage in context {
            match sections.iter_mut().find(|(source, _)| *source == passage.source_id) {
                Some((_, passages)) => passages.push(passage),
                None => sections.push((&passage.source_id, vec![passage])),
            }
        }

        let mut answer = String::from("# Summary of Uploaded Documents\n");
        for (source, passages) in &sections {
            answer.push_str(&format!("\n## {source}\n"));
            for passage in passages.iter().take(self.max_passages) {
                answer.push_str(&format!("- {}\n", self.snippet(&passage.text)));
            }
        }
        (answer.trim_end().to_string(), cited_sources(context))
    }

    fn snippet(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        match collapsed.char_indices().nth(self.snippet_chars) {
            Some((cut, _)) => format!("{}...", collapsed[..cut].trim_end()),
            None => collapsed,
        }
    }
}

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Synthesis> {
        if request.context.is_empty() {
            return Ok(Synthesis { answer: NO_INFORMATION_REPLY.to_string(), sources: BTreeSet::new() });
        }

        let (answer, sources) = match request.mode {
            RetrievalMode::Question => self.answer_question(request.context),
            RetrievalMode::Summary => self.answer_summary(request.context),
        };
        Ok(Synthesis { answer, sources })
    }

    fn name(&self) -> &str {
        "extractive"
    }
}
