//! Gemini-backed answer synthesizer.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, SessionError};
use crate::prompt::build_prompt;
use crate::synthesizer::{AnswerSynthesizer, Synthesis, SynthesisRequest, cited_sources};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

const SYNTHESIZER: &str = "Gemini";

/// An [`AnswerSynthesizer`] calling the Gemini `generateContent` endpoint.
///
/// The prompt comes from [`build_prompt`]; the cited sources are the distinct
/// sources of the retrieved context, whatever the model writes.
///
/// # Configuration
///
/// - `model` – defaults to `gemini-2.0-flash-exp`.
/// - `base_url` – defaults to the public `v1beta` API.
/// - `api_key` – from the constructor or the `GEMINI_API_KEY` environment variable.
pub struct GeminiSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiSynthesizer {
    /// Create a synthesizer with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(SessionError::Config("Gemini API key must not be empty".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
        })
    }

    /// Create a synthesizer using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            SessionError::Config("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the synthesizer at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn answer_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|part| part.text).collect();
    if text.is_empty() { None } else { Some(text) }
}

// ── AnswerSynthesizer implementation ───────────────────────────────

#[async_trait]
impl AnswerSynthesizer for GeminiSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Synthesis> {
        let prompt = build_prompt(&request);
        debug!(
            synthesizer = SYNTHESIZER,
            model = %self.model,
            prompt_len = prompt.len(),
            context_len = request.context.len(),
            "generating answer"
        );

        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts: vec![RequestPart { text: &prompt }] }],
        };

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(synthesizer = SYNTHESIZER, error = %e, "request failed");
                SessionError::synthesis(SYNTHESIZER, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(synthesizer = SYNTHESIZER, %status, "API error");
            return Err(SessionError::synthesis(
                SYNTHESIZER,
                format!("API returned {status}: {detail}"),
            ));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!(synthesizer = SYNTHESIZER, error = %e, "failed to parse response");
            SessionError::synthesis(SYNTHESIZER, format!("failed to parse response: {e}"))
        })?;

        let answer = answer_text(parsed)
            .ok_or_else(|| SessionError::synthesis(SYNTHESIZER, "response contained no text"))?;

        Ok(Synthesis { answer, sources: cited_sources(request.context) })
    }

    fn name(&self) -> &str {
        SYNTHESIZER
    }
}
