//! Response composer
//!
//! Turns how a loop finished into the text the clinician reads. Composition
//! is deterministic; the language model is only consulted to rephrase a
//! successful tool answer when enabled, and its failure never loses the
//! composed text.

use tracing::warn;

use crate::agent::cognition::{AgentState, FinishReason, ToolInvocation};
use crate::agent::intent::{ExtractedEntities, Intent};
use crate::agent::tools::ToolError;
use crate::llm::{ChatMessage, LanguageModel, LlmError};
use crate::memory::{MemoryContext, RecallHit};

/// Reply used when a collaborator or the model stays unreachable
pub const SERVICE_UNAVAILABLE: &str =
    "The clinic assistant is unavailable right now. Please try again in a few minutes.";

const CAPABILITIES: &str = "I can count patients, show a patient's profile, goals and goal progress, \
budget and spending, strategy effectiveness and session attendance, or run a query such as \
\"count sessions where engagement >= 4 for Liam O'Brien\".";

const SYSTEM_PROMPT: &str = "You are a clinical practice assistant for therapists. Answer briefly. \
Never invent patient data; if the question needs records you do not have, say which patient or \
detail you need.";

const REPHRASE_PROMPT: &str = "Rewrite the answer below for a busy clinician. Keep every name, \
number, date and identifier exactly as written. Do not add facts. Reply with the rewritten answer only.";

#[derive(Debug, Clone, Default)]
pub struct ResponseComposer {
    phrase_tool_answers: bool,
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

impl ResponseComposer {
    pub fn new(phrase_tool_answers: bool) -> Self {
        Self { phrase_tool_answers }
    }

    /// Text for a finished tool loop. Never empty.
    pub fn compose(&self, state: &AgentState, reason: &FinishReason) -> String {
        match reason {
            FinishReason::Answered => match state.best_observation() {
                Some(observation) => Self::observation_text(observation),
                None => SERVICE_UNAVAILABLE.to_string(),
            },
            FinishReason::NeedsPatient => Self::ask_for_patient(state.entities.intent),
            FinishReason::Ambiguous {
                reference,
                candidates,
            } => {
                let mut lines = vec![format!(
                    "I found {} matching {}:",
                    plural(candidates.len(), "patient"),
                    reference
                )];
                lines.extend(candidates.iter().map(|c| format!("- {}", c.label())));
                lines.push("Which one did you mean? You can reply with the patient ID.".to_string());
                lines.join("\n")
            }
            FinishReason::NotFound { reference } => format!(
                "I couldn't find a patient matching {}. Please check the spelling or give the six-digit patient ID.",
                reference
            ),
            FinishReason::ReferenceMismatch {
                name,
                identifier,
                found,
            } => format!(
                "Patient ID {} belongs to {}, not {}, so I haven't shown their records. \
Which patient did you mean? You can reply with the full name or the patient ID.",
                identifier,
                found.label(),
                name
            ),
            FinishReason::Failed { error } => Self::apology(error),
            FinishReason::BestEffort => {
                let body = state
                    .best_observation()
                    .map(Self::observation_text)
                    .unwrap_or_else(|| SERVICE_UNAVAILABLE.to_string());
                format!(
                    "I reached my step limit before finishing, so this is a best-effort answer.\n{}",
                    body
                )
            }
        }
    }

    fn observation_text(observation: &ToolInvocation) -> String {
        match (observation.output(), observation.error()) {
            (Some(output), _) => output.render(),
            (None, Some(error)) => Self::apology(error),
            (None, None) => SERVICE_UNAVAILABLE.to_string(),
        }
    }

    fn ask_for_patient(intent: Intent) -> String {
        let subject = match intent {
            Intent::PatientProfile => "whose record",
            Intent::PatientGoals | Intent::GoalProgress => "whose goals",
            Intent::BudgetInfo => "whose budget",
            Intent::StrategyInsights => "whose strategies",
            Intent::SessionEngagement => "whose sessions",
            _ => "which patient's records",
        };
        format!(
            "Which patient do you mean? Tell me {} to look up by name or patient ID, for example \"patient #123456\".",
            subject
        )
    }

    /// Specific apology for a failure the loop could not recover from
    pub fn apology(error: &ToolError) -> String {
        match error {
            ToolError::Upstream { operation, .. } => format!(
                "Sorry, I couldn't reach the clinic records while running {} and retrying didn't help. {}",
                operation, SERVICE_UNAVAILABLE
            ),
            ToolError::Timeout { operation, after_ms } => format!(
                "Sorry, the clinic records took too long to answer ({} timed out after {} ms, even after retrying). {}",
                operation, after_ms, SERVICE_UNAVAILABLE
            ),
            ToolError::Validation { message } => {
                format!("I couldn't run that request: {}.", message)
            }
            ToolError::NotFound { reference } => {
                format!("I couldn't find a patient matching {}.", reference)
            }
            ToolError::Ambiguous {
                reference,
                candidates,
            } => format!(
                "{} patients match {}; please name one of them.",
                candidates.len(),
                reference
            ),
            ToolError::PatientRequired => Self::ask_for_patient(Intent::Unknown),
        }
    }

    /// Text for a memory recall. Never empty.
    pub fn compose_recall(&self, hits: &[RecallHit]) -> String {
        if hits.is_empty() {
            return "I couldn't find anything earlier in this conversation about that.".to_string();
        }
        let mut lines = vec!["Here is what we covered earlier:".to_string()];
        lines.extend(hits.iter().map(RecallHit::render));
        lines.join("\n")
    }

    /// Prompt for a free-form answer, with conversation memory as context
    pub fn general_prompt(&self, context: &MemoryContext, query: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        if !context.summaries.is_empty() {
            let digest: Vec<&str> = context.summaries.iter().map(|s| s.content.as_str()).collect();
            messages.push(ChatMessage::system(format!(
                "Earlier in this conversation:\n{}",
                digest.join("\n")
            )));
        }
        for message in &context.messages {
            messages.push(if message.is_user() {
                ChatMessage::user(message.content.clone())
            } else {
                ChatMessage::assistant(message.content.clone())
            });
        }
        messages.push(ChatMessage::user(query));
        messages
    }

    /// Text for a language model answer, covering an offline or failed model
    pub fn compose_generated(&self, entities: &ExtractedEntities, result: Result<String, LlmError>) -> String {
        match result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) | Err(LlmError::Offline) => match entities.intent {
                Intent::GeneralQuestion => format!(
                    "I can only answer questions about your clinic's records here. {}",
                    CAPABILITIES
                ),
                _ => format!("I'm not sure what you're asking. {}", CAPABILITIES),
            },
            Err(e) => {
                warn!("Language model failed: {}", e);
                SERVICE_UNAVAILABLE.to_string()
            }
        }
    }

    /// Let the model polish a tool answer; keep `composed` on any failure
    pub async fn rephrase(&self, model: &dyn LanguageModel, query: &str, composed: String) -> String {
        if !self.phrase_tool_answers || model.is_offline() {
            return composed;
        }
        let prompt = vec![
            ChatMessage::system(REPHRASE_PROMPT),
            ChatMessage::user(format!("Question: {}\n\nAnswer:\n{}", query, composed)),
        ];
        match model.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => composed,
            Err(e) => {
                warn!("Rephrasing failed, keeping composed answer: {}", e);
                composed
            }
        }
    }
}
