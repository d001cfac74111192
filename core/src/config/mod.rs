//! Configuration
//!
//! One TOML file with a section per concern. Every section and field has a
//! default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::agent::cognition::LoopLimits;
use crate::agent::tools::{CallPolicy, DEFAULT_TOP_N};
use crate::error::AssistantError;

/// Environment variable that overrides `llm.api_key`
pub const API_KEY_ENV: &str = "CLINIC_ASSISTANT_API_KEY";

/// Assistant configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub data: DataConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

impl AssistantConfig {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Save to TOML file, creating parent directories
    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// `<config dir>/clinic-assistant/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("clinic-assistant").join("config.toml"))
    }

    /// Load from `path`, or the default location when it exists, else
    /// defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key.trim().to_string());
            }
        }
        self
    }

    /// Reject values the assistant cannot run with
    pub fn validate(&self) -> Result<(), AssistantError> {
        let invalid = |message: &str| {
            Err(AssistantError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.agent.max_iterations == 0 {
            return invalid("agent.max_iterations must be at least 1");
        }
        if self.agent.top_n == 0 {
            return invalid("agent.top_n must be at least 1");
        }
        if self.memory.window_turns == 0 {
            return invalid("memory.window_turns must be at least 1");
        }
        if self.memory.summarize_after_turns == 0 {
            return invalid("memory.summarize_after_turns must be at least 1");
        }
        if self.data.call_timeout_ms == 0 {
            return invalid("data.call_timeout_ms must be at least 1");
        }
        if let Some(url) = &self.llm.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return invalid("llm.base_url must start with http:// or https://");
            }
        }
        Ok(())
    }
}

/// Agent loop bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum tool calls per request
    pub max_iterations: usize,
    /// Repeated or fallback calls allowed after a failure
    pub retry_budget: usize,
    /// Rows listed per tool answer
    pub top_n: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let limits = LoopLimits::default();
        Self {
            max_iterations: limits.max_iterations,
            retry_budget: limits.retry_budget,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl AgentConfig {
    pub fn limits(&self) -> LoopLimits {
        LoopLimits {
            max_iterations: self.max_iterations,
            retry_budget: self.retry_budget,
        }
    }
}

/// Conversation memory tiers; window and threshold are counted in turns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turns kept verbatim
    pub window_turns: usize,
    /// Turns folded into one summary
    pub summarize_after_turns: usize,
    /// Hits returned by recall
    pub recall_limit: usize,
    /// Summarize in a background task after each reply
    pub background_summarization: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_turns: 8,
            summarize_after_turns: 6,
            recall_limit: 5,
            background_summarization: true,
        }
    }
}

/// Clinic data source and the policy applied to each call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// JSON snapshot to serve; the bundled sample when unset
    pub fixture_path: Option<PathBuf>,
    pub call_timeout_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        let policy = CallPolicy::default();
        Self {
            fixture_path: None,
            call_timeout_ms: policy.timeout.as_millis() as u64,
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl DataConfig {
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(self.call_timeout_ms),
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Language model endpoint; offline when `base_url` is unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL, e.g. `http://localhost:11434/v1`
    pub base_url: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries on rate limiting and server errors
    pub max_retries: u32,
    /// Let the model rephrase tool answers
    pub phrase_tool_answers: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 512,
            timeout_secs: 30,
            max_retries: 2,
            phrase_tool_answers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
