//! Tiered conversation memory
//!
//! The most recent `window_turns` turns stay verbatim. Older turns are folded
//! into summaries in blocks of exactly `summarize_after_turns` turns, oldest
//! first, once that many have piled up outside the window.

use tracing::{debug, info};

use super::conversation::{Conversation, Message, MessageRange, MessageRole, Summary};
use super::recall::{recall, RecallHit};
use super::summarizer::Summarizer;
use crate::agent::cognition::ToolInvocation;
use crate::config::MemoryConfig;

/// Messages per turn: the user message and the assistant reply
const MESSAGES_PER_TURN: usize = 2;

/// What the agent sees of a conversation before answering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryContext {
    pub summaries: Vec<Summary>,
    /// Unsummarized messages, oldest first; ends with the verbatim window
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct MemoryManager {
    config: MemoryConfig,
    summarizer: Summarizer,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            summarizer: Summarizer::new(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Append one completed turn
    pub fn record_turn(
        &self,
        conversation: &mut Conversation,
        user: &str,
        reply: &str,
        trace: Vec<ToolInvocation>,
    ) {
        conversation.push(MessageRole::User, user, Vec::new());
        conversation.push(MessageRole::Assistant, reply, trace);
        debug!(
            "Recorded turn in {} ({} messages)",
            conversation.id,
            conversation.messages().len()
        );
    }

    /// First message index of the verbatim window
    fn window_start(&self, conversation: &Conversation) -> usize {
        let len = conversation.messages().len();
        len.saturating_sub(self.config.window_turns * MESSAGES_PER_TURN)
    }

    /// The next block due for summarization, if any
    pub fn pending_summary_block(&self, conversation: &Conversation) -> Option<MessageRange> {
        let block = self.config.summarize_after_turns * MESSAGES_PER_TURN;
        if block == 0 {
            return None;
        }
        let first = conversation.summarized_until();
        let outside_window = self.window_start(conversation).saturating_sub(first);
        (outside_window >= block).then(|| MessageRange {
            first,
            last: first + block - 1,
        })
    }

    /// Fold every due block into a summary. Returns how many were created;
    /// a second call on unchanged state creates none.
    pub fn summarize(&self, conversation: &mut Conversation) -> usize {
        let mut created = 0;
        while let Some(range) = self.pending_summary_block(conversation) {
            let Some(summary) = self
                .summarizer
                .summarize(&conversation.messages()[range.first..=range.last])
            else {
                break;
            };
            let topics: Vec<String> = summary.topics.iter().cloned().collect();
            if !conversation.push_summary(summary) {
                break;
            }
            created += 1;
            info!(
                "Summarized messages {}-{} of {} (topics: {})",
                range.first,
                range.last,
                conversation.id,
                topics.join(", ")
            );
        }
        created
    }

    /// The most recent `window_turns` turns, verbatim
    pub fn window<'a>(&self, conversation: &'a Conversation) -> &'a [Message] {
        &conversation.messages()[self.window_start(conversation)..]
    }

    pub fn context(&self, conversation: &Conversation) -> MemoryContext {
        MemoryContext {
            summaries: conversation.summaries().to_vec(),
            messages: conversation.messages()[conversation.summarized_until()..].to_vec(),
        }
    }

    /// Rank summaries and unsummarized messages against `query`
    pub fn recall(&self, conversation: &Conversation, query: &str) -> Vec<RecallHit> {
        recall(
            conversation.summaries(),
            &conversation.messages()[conversation.summarized_until()..],
            query,
            self.config.recall_limit,
        )
    }
}
