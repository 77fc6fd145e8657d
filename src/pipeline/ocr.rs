//! OCR clients: send one page image to a vision model, get its text back.
//!
//! [`OcrClient`] is the seam between the dispatcher and the network. Two
//! implementations ship with the crate:
//!
//! * [`HttpOcrClient`]: raw OpenAI-compatible `/chat/completions` calls to a
//!   self-hosted vision server (vLLM, llama.cpp, LM Studio, ...). This is the
//!   default and the only client that sees HTTP status codes, so it can tell
//!   a malformed request (not worth retrying) from an overloaded server.
//! * [`ProviderOcrClient`]: any `edgequake_llm::LLMProvider`, for hosted
//!   models (OpenAI, Anthropic, Gemini, ...).
//!
//! Clients make exactly one attempt per call. Retries, backoff and the
//! concurrency bound belong to [`crate::pipeline::dispatch`].

use crate::config::{BatchConfig, DEFAULT_MODEL};
use crate::document::PageImage;
use crate::error::{BatchError, OcrError};
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Extracts text from a single page image.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// One attempt, bounded by `timeout`.
    async fn extract_text(&self, image: &PageImage, timeout: Duration) -> Result<String, OcrError>;
}

/// Build the client described by `config`.
///
/// Resolution order: pre-built provider, named provider, raw HTTP endpoint.
pub fn client_from_config(config: &BatchConfig) -> Result<Arc<dyn OcrClient>, BatchError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderOcrClient::new(Arc::clone(provider), config)));
    }

    if let Some(ref name) = config.provider_name {
        // The local-server model name means nothing to a hosted provider.
        let model = if config.model == DEFAULT_MODEL {
            "gpt-4.1-nano"
        } else {
            config.model.as_str()
        };
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            BatchError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        return Ok(Arc::new(ProviderOcrClient::new(provider, config)));
    }

    Ok(Arc::new(HttpOcrClient::from_config(config)?))
}

// ── OpenAI-compatible HTTP endpoint ──────────────────────────────────────

/// Client for a self-hosted OpenAI-compatible vision endpoint.
#[derive(Debug, Clone)]
pub struct HttpOcrClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
    disable_thinking: bool,
}

impl HttpOcrClient {
    pub fn from_config(config: &BatchConfig) -> Result<Self, BatchError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BatchError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: completions_url(&config.endpoint),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            prompt: config.effective_prompt().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            disable_thinking: config.disable_thinking,
        })
    }

    /// Full URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, image: &PageImage) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": encode::to_data_uri(image) } }
                    ]
                }
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if self.disable_thinking {
            body["chat_template_kwargs"] = json!({ "enable_thinking": false });
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn extract_text(&self, image: &PageImage, timeout: Duration) -> Result<String, OcrError> {
        let mut request = self
            .http
            .post(&self.url)
            .timeout(timeout)
            .json(&self.request_body(image));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::ServiceError {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OcrError::InvalidResponse("response has no message content".into()))?;
        debug!("OCR response: {} chars", text.len());
        Ok(text)
    }
}

fn completions_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> OcrError {
    if e.is_timeout() {
        OcrError::timeout(timeout)
    } else if e.is_decode() {
        OcrError::InvalidResponse(e.to_string())
    } else {
        OcrError::Transport(e.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// Adapter that runs OCR through an `edgequake_llm` vision provider.
///
/// Provider errors carry no status code, so all of them are treated as
/// transport failures and retried.
pub struct ProviderOcrClient {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderOcrClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &BatchConfig) -> Self {
        Self {
            provider,
            prompt: config.effective_prompt().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl OcrClient for ProviderOcrClient {
    async fn extract_text(&self, image: &PageImage, timeout: Duration) -> Result<String, OcrError> {
        let image_data =
            ImageData::new(encode::to_base64(image), image.mime_type).with_detail("high");
        let messages = vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        match tokio::time::timeout(timeout, self.provider.chat(&messages, Some(&options))).await {
            Err(_) => Err(OcrError::timeout(timeout)),
            Ok(Err(e)) => Err(OcrError::Transport(e.to_string())),
            Ok(Ok(response)) => {
                debug!(
                    "OCR response: {} input tokens, {} output tokens",
                    response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: &BatchConfig) -> HttpOcrClient {
        HttpOcrClient::from_config(config).expect("client builds")
    }

    #[test]
    fn completions_url_appends_path_once() {
        assert_eq!(completions_url("http://localhost:5551/v1"), "http://localhost:5551/v1/chat/completions");
        assert_eq!(completions_url("http://localhost:5551/v1/"), "http://localhost:5551/v1/chat/completions");
        assert_eq!(
            completions_url("http://h/v1/chat/completions"),
            "http://h/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_carries_image_and_prompt() {
        let config = BatchConfig::builder().model("vision_model").build().unwrap();
        let body = client(&config).request_body(&PageImage::png(vec![1, 2, 3]));

        assert_eq!(body["model"], "vision_model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], config.effective_prompt());
        let url = body["messages"][1]["content"][0]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(body["chat_template_kwargs"]["enable_thinking"], false);
    }

    #[test]
    fn thinking_flag_is_optional() {
        let config = BatchConfig::builder().disable_thinking(false).build().unwrap();
        let body = client(&config).request_body(&PageImage::png(vec![0]));
        assert!(body.get("chat_template_kwargs").is_none());
    }

    #[test]
    fn truncate_long_bodies() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc\u{2026}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Port 9 (discard) on localhost is essentially never listening.
        let config = BatchConfig::builder()
            .endpoint("http://127.0.0.1:9/v1")
            .build()
            .unwrap();
        let err = client(&config)
            .extract_text(&PageImage::png(vec![0]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "got: {err:?}");
    }
}
