//! Agent decisions
//!
//! What the engine wants done next, expressed as data. The session carries
//! decisions out; the engine never does.

use serde::{Deserialize, Serialize};

use super::state::AgentState;
use crate::agent::tools::{Tool, ToolError, ToolInput};
use crate::clinic::PatientSummary;

/// How a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopOutcome {
    Finished,
    MaxIterationsExceeded,
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FinishReason {
    /// The last observation succeeded
    Answered,
    /// Patient-scoped request with no patient to scope it to
    NeedsPatient,
    Ambiguous {
        reference: String,
        candidates: Vec<PatientSummary>,
    },
    NotFound { reference: String },
    /// The identifier belongs to a patient with a different name
    ReferenceMismatch {
        name: String,
        identifier: String,
        found: PatientSummary,
    },
    /// Validation error, or transient failure with retries exhausted
    Failed { error: ToolError },
    /// Iteration cap reached; answer from the best observation
    BestEffort,
}

impl FinishReason {
    pub fn outcome(&self) -> LoopOutcome {
        match self {
            FinishReason::BestEffort => LoopOutcome::MaxIterationsExceeded,
            _ => LoopOutcome::Finished,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentDecision {
    CallTool { tool: Tool, input: ToolInput },
    /// Answer from conversation memory; no tool call
    Recall,
    /// Answer with the language model; no tool call
    AskLanguageModel,
    Finish(FinishReason),
}

impl AgentDecision {
    /// Whether the loop ends once this decision is carried out
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentDecision::CallTool { .. })
    }
}

/// State transition produced by one engine step
#[derive(Debug, Clone)]
pub struct Transition {
    pub next_state: AgentState,
    pub decision: AgentDecision,
}

impl Transition {
    pub fn new(next_state: AgentState, decision: AgentDecision) -> Self {
        Self {
            next_state,
            decision,
        }
    }

    pub fn finish(next_state: AgentState, reason: FinishReason) -> Self {
        Self::new(
            next_state.with_phase(super::state::Phase::Finished),
            AgentDecision::Finish(reason),
        )
    }
}
