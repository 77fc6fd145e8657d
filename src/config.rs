//! Configuration for a batch OCR run.
//!
//! All run behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The defaults target a single local
//! OpenAI-compatible vision server: five concurrent calls, two retries,
//! a one-minute timeout per call.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default OpenAI-compatible endpoint of the local OCR server.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5551/v1";

/// Default model name served by the local OCR server.
pub const DEFAULT_MODEL: &str = "rolmocr";

/// Configuration for a batch run.
///
/// # Example
/// ```rust
/// use scan2text::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .max_concurrency(8)
///     .max_retries(3)
///     .timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_concurrency, 8);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Upper bound on OCR calls in flight across the whole run. Default: 5.
    ///
    /// This is the only backpressure on the OCR endpoint, which is usually a
    /// single local model instance. It is shared by every document; it is
    /// not a per-document limit.
    pub max_concurrency: usize,

    /// Extra attempts after the first failed one. Default: 2.
    ///
    /// A page is tried at most `max_retries + 1` times. Non-retryable errors
    /// (HTTP 4xx other than 408/429) fail the page immediately.
    pub max_retries: u32,

    /// Per-call timeout in seconds. Default: 60.
    pub timeout_secs: u64,

    /// Initial delay before a retry, doubled on every further retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Documents prepared and dispatched at the same time. Default: 2.
    ///
    /// Lets the next document's pages queue up while the current one drains.
    /// Memory grows with this value (each document holds all its page images),
    /// while OCR load does not: that is capped by `max_concurrency`.
    pub documents_in_flight: usize,

    /// Descend into sub-directories of the input directory. Default: true.
    pub recursive: bool,

    /// What to do with documents that finished with failed pages.
    pub partial_policy: PartialPolicy,

    /// Which built-in prompt to send with each page.
    pub prompt_style: PromptStyle,

    /// Custom system prompt. Overrides `prompt_style` when set.
    pub system_prompt: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint (without `/chat/completions`).
    pub endpoint: String,

    /// Model name sent in each request.
    pub model: String,

    /// Bearer token for the endpoint, if it wants one.
    pub api_key: Option<String>,

    /// Use a hosted edgequake-llm provider ("openai", "anthropic", ...)
    /// instead of the raw HTTP endpoint.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4096.
    pub max_tokens: usize,

    /// Ask reasoning-capable servers not to emit a thinking trace. Default: true.
    pub disable_thinking: bool,

    /// Longest edge, in pixels, of rasterised PDF pages. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Rotate rendered PDF and DOCX pages upright with tesseract's
    /// orientation detection before OCR. Requires the `tesseract` binary.
    /// Default: false.
    pub correct_orientation: bool,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            max_retries: 2,
            timeout_secs: 60,
            retry_backoff_ms: 500,
            documents_in_flight: 2,
            recursive: true,
            partial_policy: PartialPolicy::default(),
            prompt_style: PromptStyle::default(),
            system_prompt: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            disable_thinking: true,
            max_rendered_pixels: 2000,
            correct_orientation: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("max_concurrency", &self.max_concurrency)
            .field("max_retries", &self.max_retries)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("documents_in_flight", &self.documents_in_flight)
            .field("recursive", &self.recursive)
            .field("partial_policy", &self.partial_policy)
            .field("prompt_style", &self.prompt_style)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("correct_orientation", &self.correct_orientation)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The system prompt actually sent with each page.
    pub fn effective_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or_else(|| self.prompt_style.prompt())
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn documents_in_flight(mut self, n: usize) -> Self {
        self.config.documents_in_flight = n.max(1);
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    pub fn partial_policy(mut self, policy: PartialPolicy) -> Self {
        self.config.partial_policy = policy;
        self
    }

    pub fn prompt_style(mut self, style: PromptStyle) -> Self {
        self.config.prompt_style = style;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
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

    pub fn disable_thinking(mut self, v: bool) -> Self {
        self.config.disable_thinking = v;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn correct_orientation(mut self, v: bool) -> Self {
        self.config.correct_orientation = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.max_concurrency == 0 {
            return Err(BatchError::InvalidConfig(
                "max_concurrency must be ≥ 1".into(),
            ));
        }
        if c.timeout_secs == 0 {
            return Err(BatchError::InvalidConfig(
                "timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.provider.is_none() && c.provider_name.is_none() && c.endpoint.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "an endpoint or a provider is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What happens to a document whose artifact contains failed pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartialPolicy {
    /// Keep the partial artifact aside and leave the document incomplete.
    /// The next run re-dispatches only the failed pages. (default)
    #[default]
    Retry,
    /// Commit the partial artifact as final and mark the document complete.
    Accept,
}

/// Built-in OCR prompts.
///
/// | Style | Output |
/// |-------|--------|
/// | `PlainText` | Text as read naturally, no markup (default) |
/// | `Markdown` | Markdown sections, diagram descriptions as bullets |
/// | `GraphProse` | Flowing, entity-rich sentences for knowledge-graph ingestion |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptStyle {
    #[default]
    PlainText,
    Markdown,
    GraphProse,
}

impl PromptStyle {
    pub fn prompt(&self) -> &'static str {
        match self {
            PromptStyle::PlainText => crate::prompts::PLAIN_TEXT_PROMPT,
            PromptStyle::Markdown => crate::prompts::MARKDOWN_PROMPT,
            PromptStyle::GraphProse => crate::prompts::GRAPH_PROSE_PROMPT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = BatchConfig::default();
        assert_eq!(c.max_concurrency, 5);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.partial_policy, PartialPolicy::Retry);
        assert_eq!(c.endpoint, DEFAULT_ENDPOINT);
        assert!(!c.correct_orientation);
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = BatchConfig::builder().max_concurrency(0).build().unwrap();
        assert_eq!(c.max_concurrency, 1);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = BatchConfig::builder().timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn empty_endpoint_without_provider_is_rejected() {
        assert!(BatchConfig::builder().endpoint("  ").build().is_err());
        assert!(BatchConfig::builder()
            .endpoint("")
            .provider_name("openai")
            .build()
            .is_ok());
    }

    #[test]
    fn custom_prompt_overrides_style() {
        let c = BatchConfig::builder()
            .prompt_style(PromptStyle::Markdown)
            .system_prompt("Read it.")
            .build()
            .unwrap();
        assert_eq!(c.effective_prompt(), "Read it.");

        let c = BatchConfig::builder()
            .prompt_style(PromptStyle::Markdown)
            .build()
            .unwrap();
        assert_eq!(c.effective_prompt(), crate::prompts::MARKDOWN_PROMPT);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = BatchConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
    }
}
