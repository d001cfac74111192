//! Assistant service
//!
//! The public entry point used by the WebSocket server and the CLI. It owns
//! the conversation store and everything a request needs, and runs one
//! [`AgentSession`] per submitted message while holding that conversation's
//! lock.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::agent::cognition::{DispatchEngine, LoopLimits, LoopOutcome, ToolOutcome};
use crate::agent::composer::{ResponseComposer, SERVICE_UNAVAILABLE};
use crate::agent::intent::{Intent, IntentExtractor};
use crate::agent::session::{AgentReply, AgentSession, SessionDeps};
use crate::agent::tools::{Tool, ToolContext, ToolInput, ToolRegistry};
use crate::clinic::ClinicData;
use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use crate::llm::{self, LanguageModel};
use crate::memory::{Conversation, ConversationInfo, ConversationStore, MemoryManager, MessageRole};

/// Assistant message returned by [`AssistantService::submit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub conversation_id: Uuid,
    /// Position of the reply in the conversation
    pub index: usize,
    pub role: MessageRole,
    pub content: String,
    pub intent: Intent,
    pub outcome: LoopOutcome,
    /// Tools run for this reply, in call order
    pub tools: Vec<Tool>,
}

/// Result of a direct tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool: Tool,
    pub outcome: ToolOutcome,
    pub rendered: String,
}

/// Tool listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub usage: String,
}

pub struct AssistantService {
    store: ConversationStore,
    extractor: IntentExtractor,
    engine: DispatchEngine,
    tools: ToolContext,
    model: Arc<dyn LanguageModel>,
    composer: ResponseComposer,
    memory: Arc<MemoryManager>,
    limits: LoopLimits,
}

impl AssistantService {
    /// Assemble a service from explicit collaborators
    pub fn new(config: &AssistantConfig, tools: ToolContext, model: Arc<dyn LanguageModel>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: ConversationStore::new(),
            extractor: IntentExtractor::new(),
            engine: DispatchEngine::new(ToolRegistry::standard()),
            tools: tools.with_top_n(config.agent.top_n),
            model,
            composer: ResponseComposer::new(config.llm.phrase_tool_answers),
            memory: Arc::new(MemoryManager::new(config.memory.clone())),
            limits: config.agent.limits(),
        })
    }

    /// Build the language model from `config.llm` and serve `data`
    pub fn from_config(config: &AssistantConfig, data: Arc<dyn ClinicData>) -> Result<Self> {
        let model = llm::from_config(&config.llm).map_err(|e| AssistantError::InvalidConfig {
            message: e.to_string(),
        })?;
        info!("Language model: {}", model.name());
        let tools = ToolContext::new(data, config.data.call_policy());
        Self::new(config, tools, model)
    }

    /// Replace the intent routing
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.engine = DispatchEngine::new(registry);
        self
    }

    pub fn model(&self) -> &dyn LanguageModel {
        self.model.as_ref()
    }

    pub fn create_conversation(&self, title: Option<&str>) -> ConversationInfo {
        self.store.create(title.unwrap_or("New conversation"))
    }

    pub async fn rename_conversation(&self, id: Uuid, title: &str) -> Result<ConversationInfo> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AssistantError::InvalidInput {
                message: "title cannot be empty".to_string(),
            });
        }
        self.store.rename(id, title).await
    }

    pub async fn clear_conversation(&self, id: Uuid) -> Result<ConversationInfo> {
        self.store.clear(id).await
    }

    pub fn delete_conversation(&self, id: Uuid) -> Result<()> {
        self.store.delete(id)
    }

    pub async fn list_conversations(&self) -> Vec<ConversationInfo> {
        self.store.list().await
    }

    /// Copy of a conversation, taken once queued work on it has finished
    pub async fn conversation(&self, id: Uuid) -> Result<Conversation> {
        Ok(self.store.lock(id).await?.clone())
    }

    /// Answer one user message.
    ///
    /// Requests on the same conversation are answered one at a time in
    /// arrival order. Only an unknown conversation or empty text is an
    /// error; every other failure becomes the reply's content.
    pub async fn submit(&self, id: Uuid, text: &str) -> Result<AssistantMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::InvalidInput {
                message: "message text cannot be empty".to_string(),
            });
        }

        let mut conversation = self.store.lock(id).await?;
        let started = Instant::now();
        let entities = self
            .extractor
            .extract(text, self.memory.window(&conversation));
        debug!(
            "Extracted intent={} reference={:?} parameters={:?}",
            entities.intent, entities.patient_reference, entities.parameters
        );

        let deps = SessionDeps {
            engine: &self.engine,
            tools: &self.tools,
            model: self.model.as_ref(),
            composer: &self.composer,
            memory: &self.memory,
        };
        let reply = match AgentSession::new(deps, entities.clone(), self.limits)
            .run(&conversation, text)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("Agent loop aborted in {}: {}", id, e);
                AgentReply {
                    content: SERVICE_UNAVAILABLE.to_string(),
                    entities,
                    outcome: LoopOutcome::Finished,
                    iterations: 0,
                    trace: Vec::new(),
                }
            }
        };

        let tools: Vec<Tool> = reply.trace.iter().map(|t| t.tool).collect();
        self.memory
            .record_turn(&mut conversation, text, &reply.content, reply.trace);
        let index = conversation.messages().len() - 1;

        info!(
            "Answered message in {}: intent={} outcome={:?} iterations={} tools={:?} ({} ms)",
            id,
            reply.entities.intent,
            reply.outcome,
            reply.iterations,
            tools,
            started.elapsed().as_millis()
        );

        let message = AssistantMessage {
            conversation_id: id,
            index,
            role: MessageRole::Assistant,
            content: reply.content,
            intent: reply.entities.intent,
            outcome: reply.outcome,
            tools,
        };

        if self.memory.pending_summary_block(&conversation).is_some() {
            if self.memory.config().background_summarization {
                // The guard moves into the task; the next request on this
                // conversation waits until summarization is done.
                let memory = Arc::clone(&self.memory);
                tokio::spawn(async move {
                    memory.summarize(&mut conversation);
                });
            } else {
                self.memory.summarize(&mut conversation);
            }
        }

        Ok(message)
    }

    /// Run one tool directly, outside the agent loop
    pub async fn invoke_tool(&self, name: &str, input: serde_json::Value) -> Result<ToolCallResult> {
        let tool = self
            .engine
            .registry()
            .by_name(name)
            .ok_or_else(|| AssistantError::UnknownTool {
                name: name.to_string(),
            })?;
        let input: ToolInput = if input.is_null() {
            ToolInput::default()
        } else {
            serde_json::from_value(input).map_err(|e| AssistantError::InvalidInput {
                message: format!("input for {}: {}", tool, e),
            })?
        };

        info!("Direct invocation of {}", tool);
        let (outcome, rendered) = match tool.execute(&self.tools, &input).await {
            Ok(output) => {
                let rendered = output.render();
                (ToolOutcome::Ok { output }, rendered)
            }
            Err(error) => {
                let rendered = ResponseComposer::apology(&error);
                (ToolOutcome::Err { error }, rendered)
            }
        };
        Ok(ToolCallResult {
            tool,
            outcome,
            rendered,
        })
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.engine
            .registry()
            .tools()
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                usage: tool.usage().to_string(),
            })
            .collect()
    }
}
