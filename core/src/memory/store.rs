//! In-process conversation store
//!
//! Each conversation sits behind its own async mutex. Holding that lock is
//! what serializes turns: a request, or a background summarization job, owns
//! the conversation for as long as it holds the guard, and later requests
//! queue behind it in FIFO order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

use super::conversation::{Conversation, ConversationInfo};
use crate::error::{AssistantError, Result};

pub type ConversationHandle = Arc<AsyncMutex<Conversation>>;

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<Uuid, ConversationHandle>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, title: impl Into<String>) -> ConversationInfo {
        let conversation = Conversation::new(title);
        let info = conversation.info();
        self.conversations
            .lock()
            .insert(conversation.id, Arc::new(AsyncMutex::new(conversation)));
        info!("Created conversation {} ({:?})", info.id, info.title);
        info
    }

    pub fn handle(&self, id: Uuid) -> Result<ConversationHandle> {
        self.conversations
            .lock()
            .get(&id)
            .cloned()
            .ok_or(AssistantError::ConversationNotFound(id))
    }

    /// Wait for exclusive access to a conversation
    pub async fn lock(&self, id: Uuid) -> Result<OwnedMutexGuard<Conversation>> {
        let handle = self.handle(id)?;
        Ok(handle.lock_owned().await)
    }

    pub async fn rename(&self, id: Uuid, title: impl Into<String>) -> Result<ConversationInfo> {
        let mut conversation = self.lock(id).await?;
        conversation.rename(title);
        Ok(conversation.info())
    }

    pub async fn clear(&self, id: Uuid) -> Result<ConversationInfo> {
        let mut conversation = self.lock(id).await?;
        conversation.clear();
        info!("Cleared conversation {}", id);
        Ok(conversation.info())
    }

    /// Remove a conversation. A request already holding its lock finishes
    /// against the detached value.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.conversations
            .lock()
            .remove(&id)
            .map(|_| info!("Deleted conversation {}", id))
            .ok_or(AssistantError::ConversationNotFound(id))
    }

    /// Every conversation, most recently updated first
    pub async fn list(&self) -> Vec<ConversationInfo> {
        let handles: Vec<ConversationHandle> =
            self.conversations.lock().values().cloned().collect();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(handle.lock().await.info());
        }
        infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        infos
    }

    pub fn len(&self) -> usize {
        self.conversations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MessageRole;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lifecycle() {
        let store = ConversationStore::new();
        let info = store.create("New chat");
        assert_eq!(store.len(), 1);

        {
            let mut conv = store.lock(info.id).await.unwrap();
            conv.push(MessageRole::User, "hi", Vec::new());
        }

        let renamed = store.rename(info.id, "Liam follow-up").await.unwrap();
        assert_eq!(renamed.title, "Liam follow-up");
        assert_eq!(renamed.message_count, 1);

        let cleared = store.clear(info.id).await.unwrap();
        assert_eq!(cleared.message_count, 0);

        store.delete(info.id).unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.lock(info.id).await,
            Err(AssistantError::ConversationNotFound(id)) if id == info.id
        ));
        assert!(store.delete(info.id).is_err());
    }

    #[tokio::test]
    async fn test_list_orders_by_update() {
        let store = ConversationStore::new();
        let older = store.create("older");
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = store.create("newer");

        let ids: Vec<Uuid> = store.list().await.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        tokio::time::sleep(Duration::from_millis(5)).await;
        store.rename(older.id, "touched").await.unwrap();
        let ids: Vec<Uuid> = store.list().await.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_fifo() {
        let store = Arc::new(ConversationStore::new());
        let id = store.create("t").id;

        let guard = store.lock(id).await.unwrap();
        let mut waiters = Vec::new();
        for n in 0..3 {
            let store = Arc::clone(&store);
            waiters.push(tokio::spawn(async move {
                let mut conv = store.lock(id).await.unwrap();
                conv.push(MessageRole::User, format!("{}", n), Vec::new());
            }));
            // Let each waiter enqueue before the next one
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(guard);
        for waiter in waiters {
            waiter.await.unwrap();
        }

        let conv = store.lock(id).await.unwrap();
        let order: Vec<&str> = conv.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(order, vec!["0", "1", "2"]);
    }
}
