//! Agent state
//!
//! Snapshot of one request's loop. Plain data: the engine returns a new
//! snapshot on every step and never mutates the one it was given.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::input::ToolInvocation;
use crate::agent::intent::{ExtractedEntities, PatientReference};
use crate::agent::tools::{Tool, ToolInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Deciding what to do next; expects no observation
    Think,
    /// A tool call is out; expects its observation
    Act,
    Finished,
    Aborted,
}

/// Per-request bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLimits {
    /// Maximum ACT steps
    pub max_iterations: usize,
    /// Maximum repeated or fallback calls after a failed one
    pub retry_budget: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            retry_budget: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentState {
    pub entities: ExtractedEntities,
    pub phase: Phase,
    /// Tool chosen for this request, once routed
    pub tool: Option<Tool>,
    /// Input of the call currently out, or last made
    pub input: ToolInput,
    /// Narrower references still to try after NOT_FOUND
    pub fallbacks: VecDeque<PatientReference>,
    /// ACT steps taken
    pub iteration: usize,
    pub max_iterations: usize,
    pub retries_used: usize,
    pub retry_budget: usize,
    /// Every observation so far, oldest first
    pub scratchpad: Vec<ToolInvocation>,
}

impl AgentState {
    pub fn new(entities: ExtractedEntities, limits: LoopLimits) -> Self {
        Self {
            entities,
            phase: Phase::Think,
            tool: None,
            input: ToolInput::default(),
            fallbacks: VecDeque::new(),
            iteration: 0,
            max_iterations: limits.max_iterations,
            retries_used: 0,
            retry_budget: limits.retry_budget,
            scratchpad: Vec::new(),
        }
    }

    pub fn at_limit(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub fn can_retry(&self) -> bool {
        self.retries_used < self.retry_budget
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Finished | Phase::Aborted)
    }

    /// Most recent observation
    pub fn last_observation(&self) -> Option<&ToolInvocation> {
        self.scratchpad.last()
    }

    /// Newest successful observation, else the newest one
    pub fn best_observation(&self) -> Option<&ToolInvocation> {
        self.scratchpad
            .iter()
            .rev()
            .find(|o| o.succeeded())
            .or_else(|| self.scratchpad.last())
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Route to `tool`, queueing the fallbacks of the starting reference
    pub fn with_plan(mut self, tool: Tool, input: ToolInput) -> Self {
        self.fallbacks = input
            .patient_reference
            .as_ref()
            .map(|r| r.fallbacks().into())
            .unwrap_or_default();
        self.tool = Some(tool);
        self.input = input;
        self
    }

    /// Send a call out, counting one ACT step
    pub fn with_action(mut self, input: ToolInput) -> Self {
        self.iteration += 1;
        self.input = input;
        self.phase = Phase::Act;
        self
    }

    pub fn with_retry(mut self) -> Self {
        self.retries_used += 1;
        self
    }

    /// Take the next fallback reference, if any
    pub fn with_next_fallback(mut self) -> (Self, Option<PatientReference>) {
        let next = self.fallbacks.pop_front();
        (self, next)
    }

    pub fn with_observation(mut self, observation: ToolInvocation) -> Self {
        self.scratchpad.push(observation);
        self.phase = Phase::Think;
        self
    }
}
