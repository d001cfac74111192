//! Conversation data model
//!
//! Messages are append-only and indexed from 0. Summaries cover contiguous,
//! non-overlapping index ranges that always start at the first message not
//! yet summarized, so together with the unsummarized tail they reconstruct
//! the full history.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::cognition::ToolInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub index: usize,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Tools the agent ran to produce this reply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_trace: Vec<ToolInvocation>,
}

impl Message {
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// Inclusive range of message indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRange {
    pub first: usize,
    pub last: usize,
}

impl MessageRange {
    pub fn count(&self) -> usize {
        self.last + 1 - self.first
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.first && index <= self.last
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub topics: BTreeSet<String>,
    pub content: String,
    pub range: MessageRange,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    messages: Vec<Message>,
    summaries: Vec<Summary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry for a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: Uuid,
    pub title: String,
    pub message_count: usize,
    pub summary_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            messages: Vec::new(),
            summaries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn summaries(&self) -> &[Summary] {
        &self.summaries
    }

    pub fn info(&self) -> ConversationInfo {
        ConversationInfo {
            id: self.id,
            title: self.title.clone(),
            message_count: self.messages.len(),
            summary_count: self.summaries.len(),
            updated_at: self.updated_at,
        }
    }

    /// Append a message; its index is its position
    pub fn push(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        tool_trace: Vec<ToolInvocation>,
    ) -> &Message {
        let now = Utc::now();
        let index = self.messages.len();
        self.messages.push(Message {
            index,
            role,
            content: content.into(),
            timestamp: now,
            tool_trace,
        });
        self.updated_at = now;
        &self.messages[index]
    }

    /// First message index not covered by a summary
    pub fn summarized_until(&self) -> usize {
        self.summaries.last().map_or(0, |s| s.range.last + 1)
    }

    /// Attach a summary covering the next unsummarized block.
    ///
    /// Returns false and leaves the conversation untouched when the range
    /// does not start exactly at [`Self::summarized_until`] or runs past the
    /// last message.
    pub fn push_summary(&mut self, summary: Summary) -> bool {
        if summary.range.first != self.summarized_until()
            || summary.range.last < summary.range.first
            || summary.range.last >= self.messages.len()
        {
            return false;
        }
        self.summaries.push(summary);
        self.updated_at = Utc::now();
        true
    }

    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Utc::now();
    }

    /// Forget every message and summary, keep id and title
    pub fn clear(&mut self) {
        self.messages.clear();
        self.summaries.clear();
        self.updated_at = Utc::now();
    }
}
