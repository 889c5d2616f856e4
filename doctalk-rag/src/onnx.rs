//! Local sentence-transformer embeddings through ONNX Runtime.
//!
//! This module is only available when the `onnx` feature is enabled. It runs
//! a BERT-style encoder exported to ONNX (for example `all-MiniLM-L6-v2`)
//! on the CPU and mean-pools its token embeddings into one vector per text.
//! No network access is needed once the model files are on disk.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Ix3};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Value;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, error, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "ONNX";

/// Model file name expected by [`OnnxEmbeddingProvider::from_dir`].
pub const MODEL_FILE: &str = "model.onnx";
/// Tokenizer file name expected by [`OnnxEmbeddingProvider::from_dir`].
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Tokens kept per text; longer inputs are truncated.
pub const MAX_TOKENS: usize = 256;

/// Texts run through the model per inference call.
const INFERENCE_BATCH: usize = 32;

const INTRA_THREADS: usize = 4;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An [`EmbeddingProvider`] that runs a sentence-transformer model locally.
///
/// The model must accept `input_ids`, `attention_mask` and `token_type_ids`
/// and return token embeddings shaped `[batch, tokens, hidden]`. The output
/// dimension is read from a test inference at load time.
///
/// Inference runs on Tokio's blocking pool, so the provider must be used
/// from within a Tokio runtime. Clones share the loaded model.
///
/// # Example
///
/// ```rust,ignore
/// use doctalk_rag::OnnxEmbeddingProvider;
///
/// let provider = OnnxEmbeddingProvider::from_dir("models/all-MiniLM-L6-v2")?;
/// assert_eq!(provider.dimensions(), 384);
/// let embedding = provider.embed("hello world").await?;
/// ```
#[derive(Clone)]
pub struct OnnxEmbeddingProvider {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    dimension: usize,
}

impl fmt::Debug for OnnxEmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxEmbeddingProvider")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingProvider {
    /// Load a model and its tokenizer from explicit paths.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if either file is missing or invalid,
    /// or if the test inference does not yield `[batch, tokens, hidden]`.
    pub fn new(model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.is_file() {
            return Err(RagError::embedding(
                PROVIDER,
                format!("model file not found: {}", model_path.display()),
            ));
        }
        if !tokenizer_path.is_file() {
            return Err(RagError::embedding(
                PROVIDER,
                format!("tokenizer file not found: {}", tokenizer_path.display()),
            ));
        }

        let model_name = model_path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .unwrap_or(PROVIDER)
            .to_string();

        let provider = Self::load(model_path, tokenizer_path, model_name).map_err(|e| {
            error!(provider = PROVIDER, model = %model_path.display(), error = %e, "failed to load model");
            RagError::embedding(PROVIDER, format!("failed to load {}: {e}", model_path.display()))
        })?;

        info!(
            provider = PROVIDER,
            model = %provider.model_name,
            dimension = provider.dimension,
            "embedding model loaded"
        );
        Ok(provider)
    }

    /// Load `model.onnx` and `tokenizer.json` from `dir`.
    ///
    /// # Errors
    ///
    /// See [`OnnxEmbeddingProvider::new`].
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Self::new(dir.join(MODEL_FILE), dir.join(TOKENIZER_FILE))
    }

    /// Name of the directory the model was loaded from.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        model_name: String,
    ) -> std::result::Result<Self, BoxError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(INTRA_THREADS)?
            .commit_from_file(model_path)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)?;
        tokenizer.with_truncation(Some(TruncationParams {
            max_length: MAX_TOKENS,
            ..Default::default()
        }))?;

        let mut provider = Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension: 0,
        };

        let check = provider.infer(&["validation test"])?;
        provider.dimension = match check.first().map(Vec::len) {
            Some(dimension) if dimension > 0 => dimension,
            _ => return Err("model produced an empty embedding".into()),
        };
        Ok(provider)
    }

    /// Tokenize, pad to the longest text, run the model and pool.
    fn infer(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, BoxError> {
        let encodings = texts
            .iter()
            .map(|text| self.tokenizer.encode(*text, true))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let rows = encodings.len();
        let cols = encodings.iter().map(|encoding| encoding.get_ids().len()).max().unwrap_or(0);
        let mut input_ids = Array2::<i64>::zeros((rows, cols));
        let mut attention_mask = Array2::<i64>::zeros((rows, cols));
        for (row, encoding) in encodings.iter().enumerate() {
            let tokens = encoding.get_ids().iter().zip(encoding.get_attention_mask());
            for (col, (&id, &mask)) in tokens.enumerate() {
                input_ids[[row, col]] = i64::from(id);
                attention_mask[[row, col]] = i64::from(mask);
            }
        }
        let token_type_ids = Array2::<i64>::zeros((rows, cols));

        let mut session = self.session.lock().map_err(|_| "model session lock poisoned")?;
        let outputs = session.run(ort::inputs![
            "input_ids" => Value::from_array(input_ids)?,
            "attention_mask" => Value::from_array(attention_mask.clone())?,
            "token_type_ids" => Value::from_array(token_type_ids)?
        ])?;
        let hidden = outputs[0].try_extract_array::<f32>()?.into_dimensionality::<Ix3>()?;

        if hidden.shape()[0] != rows {
            return Err(format!("model returned {} rows for {rows} inputs", hidden.shape()[0]).into());
        }
        Ok((0..rows)
            .map(|row| mean_pool(hidden.index_axis(Axis(0), row), attention_mask.row(row)))
            .collect())
    }
}

/// Average the token embeddings whose mask is set.
///
/// Padding rows are ignored. A fully masked input pools to the zero vector.
fn mean_pool(tokens: ArrayView2<'_, f32>, mask: ArrayView1<'_, i64>) -> Vec<f32> {
    let mut pooled = vec![0.0f32; tokens.ncols()];
    let mut weight = 0.0f32;
    for (token, &m) in tokens.outer_iter().zip(mask.iter()) {
        if m == 0 {
            continue;
        }
        let m = m as f32;
        weight += m;
        for (acc, &x) in pooled.iter_mut().zip(token.iter()) {
            *acc += x * m;
        }
    }
    if weight > 0.0 {
        for value in &mut pooled {
            *value /= weight;
        }
    }
    pooled
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model_name, "embedding batch");

        let model = self.clone();
        let owned: Vec<String> = texts.iter().map(|text| (*text).to_string()).collect();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut vectors = Vec::with_capacity(owned.len());
            for batch in owned.chunks(INFERENCE_BATCH) {
                let batch: Vec<&str> = batch.iter().map(String::as_str).collect();
                vectors.extend(model.infer(&batch)?);
            }
            Ok::<_, BoxError>(vectors)
        })
        .await
        .map_err(|e| RagError::embedding(PROVIDER, format!("inference task failed: {e}")))?
        .map_err(|e| {
            error!(provider = PROVIDER, error = %e, "inference failed");
            RagError::embedding(PROVIDER, format!("inference failed: {e}"))
        })?;

        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(RagError::embedding(
                PROVIDER,
                format!("model returned {} dimensions, expected {}", bad.len(), self.dimension),
            ));
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
