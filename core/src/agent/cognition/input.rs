//! Observations
//!
//! The result of one ACT step, fed back into the engine on the next step and
//! kept on the scratchpad as the request's tool trace.

use serde::{Deserialize, Serialize};

use crate::agent::tools::{Tool, ToolError, ToolInput, ToolOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { output: ToolOutput },
    Err { error: ToolError },
}

/// One tool call and what came back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// ACT step this call was made in, starting at 1
    pub iteration: usize,
    pub tool: Tool,
    pub input: ToolInput,
    pub outcome: ToolOutcome,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl ToolInvocation {
    pub fn new(
        iteration: usize,
        tool: Tool,
        input: ToolInput,
        result: Result<ToolOutput, ToolError>,
        elapsed_ms: u64,
    ) -> Self {
        let outcome = match result {
            Ok(output) => ToolOutcome::Ok { output },
            Err(error) => ToolOutcome::Err { error },
        };
        Self {
            iteration,
            tool,
            input,
            outcome,
            elapsed_ms,
        }
    }

    pub fn output(&self) -> Option<&ToolOutput> {
        match &self.outcome {
            ToolOutcome::Ok { output } => Some(output),
            ToolOutcome::Err { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            ToolOutcome::Ok { .. } => None,
            ToolOutcome::Err { error } => Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.output().is_some()
    }
}
