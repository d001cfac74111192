//! Structured error types for the clinic assistant
//!
//! Layer errors (tools, clinic data, language model, registry) live next to
//! the code that raises them. `AssistantError` is what callers of the public
//! service API see; everything recoverable is handled inside the agent loop
//! and never reaches this type.

use thiserror::Error;
use uuid::Uuid;

use crate::agent::tools::registry::RegistryError;

/// Primary error type for service operations
#[derive(Error, Debug)]
pub enum AssistantError {
    // =========================================================================
    // Conversation Errors
    // =========================================================================
    /// Conversation id is unknown (never created or already deleted)
    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),

    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Caller supplied something the service cannot act on
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Debug invocation named a tool that does not exist
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    // =========================================================================
    // Contract / Configuration Errors
    // =========================================================================
    /// Tool routing is malformed; the agent loop cannot run
    #[error("tool registry is malformed: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration values are unusable
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    // =========================================================================
    // External Error Wrappers (transparent)
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssistantError {
    /// Whether the caller can fix this by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound(_) | Self::InvalidInput { .. } | Self::UnknownTool { .. }
        )
    }

    /// Short machine-readable code used by the WebSocket protocol
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConversationNotFound(_) => "conversation_not_found",
            Self::InvalidInput { .. } => "invalid_input",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::Registry(_) => "registry",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::ConversationNotFound(_) => {
                "That conversation no longer exists. Please start a new one.".to_string()
            }
            Self::Registry(_) | Self::Io(_) => {
                "The assistant is unavailable right now. Please try again later.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type alias using AssistantError
pub type Result<T> = std::result::Result<T, AssistantError>;
