//! Conversation memory: data model, store, summarization and recall

pub mod conversation;
pub mod manager;
pub mod recall;
pub mod store;
pub mod summarizer;

pub use conversation::{Conversation, ConversationInfo, Message, MessageRange, MessageRole, Summary};
pub use manager::{MemoryContext, MemoryManager};
pub use recall::RecallHit;
pub use store::{ConversationHandle, ConversationStore};
pub use summarizer::Summarizer;
