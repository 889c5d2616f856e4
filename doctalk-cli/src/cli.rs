//! Command-line arguments and service construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use doctalk_rag::{Document, EmbeddingProvider, HashingEmbedder, RagConfig};
use doctalk_session::{AnswerSynthesizer, DocChat, ExtractiveSynthesizer, SessionConfig};
use tracing::info;

/// Chat with your documents from the terminal.
#[derive(Debug, Parser)]
#[command(name = "doctalk", version, about)]
pub struct Args {
    /// Plain-text files to upload.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Maximum chunk length in characters.
    #[arg(long, env = "DOCTALK_CHUNK_SIZE", default_value_t = 512)]
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks.
    #[arg(long, env = "DOCTALK_CHUNK_OVERLAP", default_value_t = 50)]
    pub chunk_overlap: usize,

    /// Results requested from the index per question.
    #[arg(long, env = "DOCTALK_TOP_K", default_value_t = 15)]
    pub top_k: usize,

    /// Idle seconds before the session is discarded.
    #[arg(long, env = "DOCTALK_SESSION_TTL_SECS", default_value_t = 24 * 60 * 60)]
    pub ttl_secs: u64,

    /// Embedding backend.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Hashing)]
    pub embedder: EmbedderKind,

    /// Directory holding `model.onnx` and `tokenizer.json` for `--embedder onnx`.
    #[arg(long, env = "DOCTALK_ONNX_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Answer backend.
    #[arg(long, value_enum, default_value_t = SynthesizerKind::Extractive)]
    pub synthesizer: SynthesizerKind,
}

/// Available embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Offline feature hashing.
    Hashing,
    /// OpenAI embeddings, key from `OPENAI_API_KEY` (needs the `openai` feature).
    Openai,
    /// Local sentence-transformer model from `--model-dir` (needs the `onnx` feature).
    Onnx,
}

/// Available answer synthesizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SynthesizerKind {
    /// Quotes retrieved passages.
    Extractive,
    /// Gemini, key from `GEMINI_API_KEY` (needs the `gemini` feature).
    Gemini,
}

impl Args {
    /// Validated retrieval settings.
    pub fn rag_config(&self) -> anyhow::Result<RagConfig> {
        let config = RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .build()?;
        Ok(config)
    }

    /// Validated session settings.
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let config = SessionConfig::builder().ttl(Duration::from_secs(self.ttl_secs)).build()?;
        Ok(config)
    }

    /// Build the chat service from the selected backends.
    pub fn build_chat(&self) -> anyhow::Result<DocChat> {
        let chat = DocChat::builder()
            .rag_config(self.rag_config()?)
            .session_config(self.session_config()?)
            .embedder(self.embedder()?)
            .synthesizer(self.synthesizer()?)
            .build()?;
        Ok(chat)
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        let embedder: Arc<dyn EmbeddingProvider> = match self.embedder {
            EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
            #[cfg(feature = "openai")]
            EmbedderKind::Openai => Arc::new(doctalk_rag::OpenAIEmbeddingProvider::from_env()?),
            #[cfg(not(feature = "openai"))]
            EmbedderKind::Openai => bail!("doctalk was built without the `openai` feature"),
            #[cfg(feature = "onnx")]
            EmbedderKind::Onnx => {
                let Some(dir) = &self.model_dir else {
                    bail!("--embedder onnx needs --model-dir or DOCTALK_ONNX_MODEL_DIR");
                };
                Arc::new(doctalk_rag::OnnxEmbeddingProvider::from_dir(dir)?)
            }
            #[cfg(not(feature = "onnx"))]
            EmbedderKind::Onnx => bail!("doctalk was built without the `onnx` feature"),
        };
        Ok(embedder)
    }

    fn synthesizer(&self) -> anyhow::Result<Arc<dyn AnswerSynthesizer>> {
        let synthesizer: Arc<dyn AnswerSynthesizer> = match self.synthesizer {
            SynthesizerKind::Extractive => Arc::new(ExtractiveSynthesizer::new()),
            #[cfg(feature = "gemini")]
            SynthesizerKind::Gemini => Arc::new(doctalk_session::GeminiSynthesizer::from_env()?),
            #[cfg(not(feature = "gemini"))]
            SynthesizerKind::Gemini => bail!("doctalk was built without the `gemini` feature"),
        };
        Ok(synthesizer)
    }
}

/// Read `paths` into documents named by their file names.
pub fn load_documents(paths: &[PathBuf]) -> anyhow::Result<Vec<Document>> {
    paths.iter().map(|path| load_document(path)).collect()
}

fn load_document(path: &Path) -> anyhow::Result<Document> {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        bail!("{} has no usable file name", path.display());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {} as UTF-8 text", path.display()))?;
    info!(file = name, chars = text.chars().count(), "loaded document");
    Ok(Document::new(name, text))
}
