//! Configuration types for a comment-extraction batch.
//!
//! All batch behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. One struct holds every knob so the CLI and
//! the HTTP service can share a base config and layer per-request values (the
//! API key) on top with a cheap clone.

use crate::error::ExtractError;
use crate::pipeline::normalize::DEFAULT_MAX_FALLBACK_CHARS;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default Gemini model used when an API key is given without a model id.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Default model for named `edgequake_llm` providers.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Configuration for a comment-extraction batch.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use comment_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("AIza...")
///     .model("gemini-2.0-flash")
///     .render_scale(2.5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Upscaling factor applied when rasterising PDF pages. Range: 2.0–4.0. Default: 2.0.
    ///
    /// Comment text in exported social-media PDFs is small; rendering at
    /// native resolution leaves usernames and like counts unreadable.
    pub render_scale: f32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Caps memory on oversized pages independently of the scale factor.
    pub max_rendered_pixels: u32,

    /// Model identifier. Defaults to [`DEFAULT_GEMINI_MODEL`] with an API key
    /// and [`DEFAULT_PROVIDER_MODEL`] with a named provider.
    pub model: Option<String>,

    /// API key for the Gemini REST API. Never logged.
    pub api_key: Option<String>,

    /// `edgequake_llm` provider name (e.g. "openai", "anthropic", "ollama").
    /// The provider reads its own key from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    ///
    /// A long comment thread can exceed 2 000 output tokens; too low a limit
    /// truncates the JSON and pushes the page down the fallback ladder.
    pub max_tokens: usize,

    /// Length of the last-resort comment, in characters. Default: 500.
    pub max_fallback_chars: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to the pdfium shared library. Falls back to
    /// `PDFIUM_LIB_PATH`, then to the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-file / per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            max_rendered_pixels: 4000,
            model: None,
            api_key: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_fallback_chars: DEFAULT_MAX_FALLBACK_CHARS,
            password: None,
            pdfium_lib_path: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_fallback_chars", &self.max_fallback_chars)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether any way of reaching a model has been configured.
    pub fn has_credential(&self) -> bool {
        self.provider.is_some()
            || self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            || self.provider_name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(2.0, 4.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_fallback_chars(mut self, n: usize) -> Self {
        self.config.max_fallback_chars = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(2.0..=4.0).contains(&c.render_scale) {
            return Err(ExtractError::InvalidConfig(format!(
                "render scale must be 2.0–4.0, got {}",
                c.render_scale
            )));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max tokens must be ≥ 1".into(),
            ));
        }
        if c.max_fallback_chars == 0 {
            return Err(ExtractError::InvalidConfig(
                "fallback length must be ≥ 1 character".into(),
            ));
        }
        Ok(self.config)
    }
}
