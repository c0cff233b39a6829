//! In-memory reference store
//!
//! Keeps conversations and message ownership in process memory. Used by tests
//! and by embedders that don't need durability.

use crate::{
    storage::{
        conversation::Conversation,
        store::{ConversationStore, MessageDirectory},
    },
    Error, Result,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Reference implementation of [`ConversationStore`] and [`MessageDirectory`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    messages: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delivered message so it can be pinned later
    pub fn record_message(&self, message_id: &str, conversation_id: &str) -> Result<()> {
        lock(&self.messages)?.insert(message_id.to_string(), conversation_id.to_string());
        Ok(())
    }

    /// Number of stored conversations
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.conversations)?.len())
    }

    /// Whether the store holds no conversations
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::StoreUnavailable("in-memory store lock poisoned".to_string()))
}

impl ConversationStore for MemoryStore {
    fn load(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(lock(&self.conversations)?.get(conversation_id).cloned())
    }

    fn save(&self, conversation: &Conversation) -> Result<u64> {
        let mut conversations = lock(&self.conversations)?;

        let stored_revision = conversations
            .get(&conversation.id)
            .map(|c| c.revision)
            .unwrap_or(0);
        if stored_revision != conversation.revision {
            tracing::warn!(
                "Revision mismatch on {}: stored {}, saving {}",
                conversation.id,
                stored_revision,
                conversation.revision
            );
            return Err(Error::Conflict(conversation.id.clone()));
        }

        let mut document = conversation.clone();
        document.revision = stored_revision + 1;
        document.typing_users.clear();
        conversations.insert(document.id.clone(), document);

        Ok(stored_revision + 1)
    }

    fn query_by_participant(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conversations = lock(&self.conversations)?;

        let mut found: Vec<Conversation> = conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

        Ok(found)
    }

    fn delete(&self, conversation_id: &str) -> Result<()> {
        lock(&self.conversations)?.remove(conversation_id);
        lock(&self.messages)?.retain(|_, owner| owner != conversation_id);
        Ok(())
    }
}

impl MessageDirectory for MemoryStore {
    fn conversation_of(&self, message_id: &str) -> Result<Option<String>> {
        Ok(lock(&self.messages)?.get(message_id).cloned())
    }
}
