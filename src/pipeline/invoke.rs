//! Model invocation: send one page image plus the extraction instruction to
//! a vision model and return its raw text.
//!
//! Two backends sit behind [`ModelInvoker`]:
//!
//! * [`GeminiInvoker`] talks to the Gemini `generateContent` REST endpoint
//!   with a caller-supplied API key. This is the path the HTTP service uses,
//!   since each request carries its own key.
//! * [`ProviderInvoker`] wraps any `edgequake_llm` provider (OpenAI,
//!   Anthropic, Ollama, ...), for CLI and library users who already have one.
//!
//! An invoker only moves bytes. It does not parse the reply; whatever text
//! comes back goes to [`crate::pipeline::normalize`] verbatim. There is no
//! retry: a failed call degrades that page and the batch moves on.

use super::encode::{to_base64, to_image_data};
use super::rasterize::PageImage;
use crate::config::{ExtractionConfig, DEFAULT_GEMINI_MODEL, DEFAULT_PROVIDER_MODEL};
use crate::error::{ExtractError, InvocationError};
use crate::prompts::EXTRACTION_INSTRUCTION;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Base URL of the Gemini REST API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Sends one page to a model and returns its raw textual reply.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, page: &PageImage) -> Result<String, InvocationError>;
}

/// Pick the invoker for a config, most specific first: a pre-built
/// provider, then a Gemini API key, then a named `edgequake_llm` provider.
pub fn resolve_invoker(config: &ExtractionConfig) -> Result<Arc<dyn ModelInvoker>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderInvoker::new(
            Arc::clone(provider),
            config.temperature,
            config.max_tokens,
        )));
    }

    if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        info!("Using Gemini model {}", model);
        return Ok(Arc::new(
            GeminiInvoker::new(key, model).with_generation(config.temperature, config.max_tokens),
        ));
    }

    if let Some(name) = config.provider_name.as_deref().filter(|n| !n.trim().is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            ExtractError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        info!("Using provider {} with model {}", name, model);
        return Ok(Arc::new(ProviderInvoker::new(
            provider,
            config.temperature,
            config.max_tokens,
        )));
    }

    Err(ExtractError::MissingCredential)
}

// ── edgequake-llm ────────────────────────────────────────────────────────

/// Invoker backed by an `edgequake_llm` provider.
///
/// The request is a system message holding the extraction instruction and a
/// user message whose only content is the page image.
pub struct ProviderInvoker {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderInvoker {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        build_options(self.temperature, self.max_tokens)
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl ModelInvoker for ProviderInvoker {
    async fn invoke(&self, page: &PageImage) -> Result<String, InvocationError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(EXTRACTION_INSTRUCTION),
            ChatMessage::user_with_images("", vec![to_image_data(page)]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| InvocationError::Provider(format!("{}", e)))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            page.display_name(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(InvocationError::EmptyResponse);
        }
        Ok(response.content)
    }
}

// ── Gemini REST ──────────────────────────────────────────────────────────

/// Invoker for the Gemini `generateContent` endpoint.
///
/// No `Debug` impl: holds the caller's API key.
#[derive(Clone)]
pub struct GeminiInvoker {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: usize,
}

impl GeminiInvoker {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
        }
    }

    /// Point the invoker at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(&self, page: &PageImage) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": EXTRACTION_INSTRUCTION },
                    {
                        "inline_data": {
                            "mime_type": page.mime_type,
                            "data": to_base64(page),
                        }
                    }
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            }
        })
    }
}

#[async_trait]
impl ModelInvoker for GeminiInvoker {
    async fn invoke(&self, page: &PageImage) -> Result<String, InvocationError> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(page))
            .send()
            .await
            .map_err(|e| InvocationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InvocationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(InvocationError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let text = response_text(&body)?;
        debug!(
            "{}: {} chars from {} in {:?}",
            page.display_name(),
            text.len(),
            self.model,
            start.elapsed()
        );
        Ok(text)
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn response_text(body: &str) -> Result<String, InvocationError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| InvocationError::Transport(format!("malformed response body: {e}")))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(InvocationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// `error.message` from a Gemini error body, or the body itself.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
