//! OpenAI-compatible chat client
//!
//! Works with OpenAI, Ollama, LM Studio and other servers exposing
//! `/chat/completions`. Rate limiting (429) and server errors are retried
//! with jittered backoff; other failures are returned as [`LlmError`].

use async_trait::async_trait;
use rand::Rng;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient, StatusCode,
};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::{ChatMessage, LanguageModel, LlmError};
use crate::config::LlmConfig;

pub struct OpenAiClient {
    config: LlmConfig,
    base_url: String,
    http_client: HttpClient,
}

/// Trim and check an endpoint URL before any request is built
fn sanitize_base_url(url: &str) -> Result<String, LlmError> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(LlmError::Config {
            message: "base URL cannot be empty".to_string(),
        });
    }
    if trimmed.contains("%2F") || trimmed.contains("%3D") || trimmed.contains("%20") {
        return Err(LlmError::Config {
            message: "base URL appears to be URL-encoded twice".to_string(),
        });
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(LlmError::Config {
            message: format!("base URL must start with http:// or https://, got {}", trimmed),
        });
    }
    Ok(trimmed.to_string())
}

/// Bearer header for a key, `None` for an empty or "none" key
fn authorization(api_key: Option<&str>) -> Result<Option<HeaderValue>, LlmError> {
    let Some(key) = api_key.map(str::trim) else {
        return Ok(None);
    };
    if key.is_empty() || key.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    if key.chars().any(|c| c.is_control()) {
        return Err(LlmError::Config {
            message: "API key contains control characters".to_string(),
        });
    }
    HeaderValue::from_str(&format!("Bearer {}", key))
        .map(Some)
        .map_err(|_| LlmError::Config {
            message: format!(
                "API key is not a valid header value ({} characters)",
                key.len()
            ),
        })
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let base_url = sanitize_base_url(config.base_url.as_deref().unwrap_or_default())?;
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent("clinic-assistant/0.1")
            .build()
            .map_err(|e| LlmError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(value) = authorization(self.config.api_key.as_deref())? {
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn map_send_error(&self, error: reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout {
                after_secs: self.config.timeout_secs,
            }
        } else {
            LlmError::Unavailable {
                message: error.to_string(),
            }
        }
    }

    /// Send with jittered backoff on 429 and 5xx, honouring Retry-After
    async fn send_with_backoff(&self, body: &OpenAiRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.build_headers()?;
        let mut attempt = 0;
        let mut delay = Duration::from_millis(500);

        loop {
            let result = self
                .http_client
                .post(&url)
                .headers(headers.clone())
                .json(body)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) if attempt < self.config.max_retries && !e.is_builder() => {
                    warn!("Language model request failed, retrying in {:?}: {}", delay, e);
                    attempt += 1;
                    sleep(delay).await;
                    delay = jitter(delay * 2);
                    continue;
                }
                Err(e) => return Err(self.map_send_error(e)),
            };

            let status = response.status();
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if status.is_success() || !retryable || attempt >= self.config.max_retries {
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let wait = retry_after.unwrap_or(delay);
            warn!(
                "Language model returned {}, waiting {:?} before retry (attempt {}/{})",
                status,
                wait,
                attempt + 1,
                self.config.max_retries
            );
            attempt += 1;
            sleep(wait).await;
            delay = jitter(delay * 2);
        }
    }
}

/// +/- 20% so concurrent clients do not retry in lockstep
fn jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as i64;
    let spread = (millis / 5).max(1);
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((millis + offset).max(0) as u64)
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = OpenAiRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };
        debug!(
            "Chat request: model={}, messages={}",
            self.config.model,
            messages.len()
        );

        let response = self.send_with_backoff(&body).await?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or(text);
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: message,
            });
        }

        let parsed: OpenAiResponse = serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
            message: e.to_string(),
        })?;
        if let Some(usage) = &parsed.usage {
            debug!(
                "Chat completed: prompt={} completion={} total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "response has no message content".to_string(),
            })
    }
}

// OpenAI-compatible API types
#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
