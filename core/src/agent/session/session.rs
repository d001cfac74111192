//! Session orchestrator
//!
//! One `AgentSession` answers one request. It feeds observations to the
//! dispatch engine and carries out each decision: tool calls, memory recall
//! or a language model answer. The session owns its scratchpad and counters;
//! nothing is shared between requests.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::cognition::{
    AgentDecision, AgentError, AgentState, DispatchEngine, FinishReason, LoopLimits, LoopOutcome,
    ToolInvocation,
};
use crate::agent::composer::ResponseComposer;
use crate::agent::intent::ExtractedEntities;
use crate::agent::tools::ToolContext;
use crate::llm::LanguageModel;
use crate::memory::{Conversation, MemoryManager};

/// What a finished request produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub content: String,
    pub entities: ExtractedEntities,
    pub outcome: LoopOutcome,
    /// ACT steps taken
    pub iterations: usize,
    pub trace: Vec<ToolInvocation>,
}

/// Everything a session borrows from the service
#[derive(Clone, Copy)]
pub struct SessionDeps<'a> {
    pub engine: &'a DispatchEngine,
    pub tools: &'a ToolContext,
    pub model: &'a dyn LanguageModel,
    pub composer: &'a ResponseComposer,
    pub memory: &'a MemoryManager,
}

pub struct AgentSession<'a> {
    deps: SessionDeps<'a>,
    state: AgentState,
}

impl<'a> AgentSession<'a> {
    pub fn new(deps: SessionDeps<'a>, entities: ExtractedEntities, limits: LoopLimits) -> Self {
        Self {
            deps,
            state: AgentState::new(entities, limits),
        }
    }

    /// Run until the engine finishes.
    ///
    /// `conversation` is the history before this request; it is read for
    /// recall and model context, never written.
    pub async fn run(mut self, conversation: &Conversation, query: &str) -> Result<AgentReply, AgentError> {
        let deps = self.deps;
        let mut observation: Option<ToolInvocation> = None;

        loop {
            debug!(
                "THINK intent={} iteration={} retries={}",
                self.state.entities.intent, self.state.iteration, self.state.retries_used
            );
            let transition = deps.engine.step(&self.state, observation.take())?;
            self.state = transition.next_state;

            match transition.decision {
                AgentDecision::CallTool { tool, input } => {
                    debug!("ACT {} (iteration {})", tool, self.state.iteration);
                    let started = Instant::now();
                    let result = tool.execute(deps.tools, &input).await;
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    match &result {
                        Ok(_) => debug!("OBSERVE {} ok in {}ms", tool, elapsed_ms),
                        Err(e) => warn!("OBSERVE {} failed with {}: {}", tool, e.code(), e),
                    }
                    observation = Some(ToolInvocation::new(
                        self.state.iteration,
                        tool,
                        input,
                        result,
                        elapsed_ms,
                    ));
                }
                AgentDecision::Recall => {
                    let hits = deps.memory.recall(conversation, query);
                    debug!("Recall returned {} hit(s)", hits.len());
                    let content = deps.composer.compose_recall(&hits);
                    return Ok(self.finish(content, LoopOutcome::Finished));
                }
                AgentDecision::AskLanguageModel => {
                    let prompt = deps
                        .composer
                        .general_prompt(&deps.memory.context(conversation), query);
                    debug!("Asking {} ({} messages)", deps.model.name(), prompt.len());
                    let result = deps.model.complete(&prompt).await;
                    let content = deps.composer.compose_generated(&self.state.entities, result);
                    return Ok(self.finish(content, LoopOutcome::Finished));
                }
                AgentDecision::Finish(reason) => {
                    debug!("FINISH {:?} after {} iteration(s)", reason, self.state.iteration);
                    let mut content = deps.composer.compose(&self.state, &reason);
                    if reason == FinishReason::Answered {
                        content = deps.composer.rephrase(deps.model, query, content).await;
                    }
                    return Ok(self.finish(content, reason.outcome()));
                }
            }
        }
    }

    fn finish(self, content: String, outcome: LoopOutcome) -> AgentReply {
        AgentReply {
            content,
            outcome,
            iterations: self.state.iteration,
            trace: self.state.scratchpad,
            entities: self.state.entities,
        }
    }
}
