//! WebSocket wire protocol
//!
//! Every frame is a JSON [`MessageEnvelope`]. The envelope's `type` repeats
//! the payload's tag so clients can dispatch without parsing the payload.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::cognition::LoopOutcome;
use crate::agent::intent::Intent;
use crate::agent::tools::Tool;
use crate::memory::ConversationInfo;
use crate::service::{AssistantMessage, ToolCallResult, ToolDescriptor};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageEnvelope<T> {
    pub v: u32,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    pub payload: T,
}

impl MessageEnvelope<ServerEvent> {
    /// Wrap a server event, echoing the request it answers
    pub fn event(request_id: Option<Uuid>, payload: ServerEvent) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            msg_type: payload.kind().to_string(),
            request_id,
            payload,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        client: ClientInfo,
    },
    CreateConversation {
        #[serde(default)]
        title: Option<String>,
    },
    RenameConversation {
        conversation_id: Uuid,
        title: String,
    },
    ClearConversation {
        conversation_id: Uuid,
    },
    DeleteConversation {
        conversation_id: Uuid,
    },
    ListConversations,
    SendMessage {
        conversation_id: Uuid,
        text: String,
    },
    InvokeTool {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    HelloAck {
        server: ServerInfo,
        tools: Vec<ToolDescriptor>,
    },
    ConversationCreated {
        conversation: ConversationInfo,
    },
    Conversations {
        conversations: Vec<ConversationInfo>,
    },
    AssistantMessage {
        conversation_id: Uuid,
        index: usize,
        content: String,
        intent: Intent,
        outcome: LoopOutcome,
        tools: Vec<Tool>,
    },
    ToolResult {
        result: ToolCallResult,
    },
    /// Acknowledges rename, clear and delete
    Ack {
        conversation: Option<ConversationInfo>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    /// Tag used for the envelope `type`
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::HelloAck { .. } => "hello_ack",
            ServerEvent::ConversationCreated { .. } => "conversation_created",
            ServerEvent::Conversations { .. } => "conversations",
            ServerEvent::AssistantMessage { .. } => "assistant_message",
            ServerEvent::ToolResult { .. } => "tool_result",
            ServerEvent::Ack { .. } => "ack",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<AssistantMessage> for ServerEvent {
    fn from(message: AssistantMessage) -> Self {
        ServerEvent::AssistantMessage {
            conversation_id: message.conversation_id,
            index: message.index,
            content: message.content,
            intent: message.intent,
            outcome: message.outcome,
            tools: message.tools,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}
