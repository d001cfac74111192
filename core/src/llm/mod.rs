//! Language model access
//!
//! The assistant only needs plain chat completion: answering general
//! questions and, optionally, rephrasing tool answers. [`OpenAiClient`]
//! talks to any OpenAI-compatible endpoint; [`OfflineModel`] stands in when
//! none is configured.

pub mod client;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::OpenAiClient;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("language model unreachable: {message}")]
    Unavailable { message: String },

    #[error("language model timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("language model returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unexpected language model response: {message}")]
    InvalidResponse { message: String },

    #[error("language model is misconfigured: {message}")]
    Config { message: String },

    #[error("no language model is configured")]
    Offline,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier shown in logs
    fn name(&self) -> &str;

    /// Stand-in model that cannot generate text
    fn is_offline(&self) -> bool {
        false
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Used when no endpoint is configured. It never generates text; callers
/// fall back to their own wording.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    fn is_offline(&self) -> bool {
        true
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Err(LlmError::Offline)
    }
}

/// Model for a configuration: the HTTP client when an endpoint is set
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>, LlmError> {
    match &config.base_url {
        Some(_) => Ok(Arc::new(OpenAiClient::new(config.clone())?)),
        None => Ok(Arc::new(OfflineModel)),
    }
}
