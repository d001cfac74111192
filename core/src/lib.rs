//! Clinic assistant core
//!
//! Conversational access to a therapy practice's records: intent extraction,
//! a bounded tool-dispatch loop, tiered conversation memory and response
//! composition, exposed through [`AssistantService`].

pub mod agent;
pub mod clinic;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod protocol;
pub mod service;

// Re-exports for convenience
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use service::{AssistantMessage, AssistantService, ToolCallResult, ToolDescriptor};
