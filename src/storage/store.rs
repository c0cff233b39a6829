//! Persistence seams used by the conversation service

use crate::{storage::conversation::Conversation, Result};

/// Durable storage for conversation records
///
/// Implementations hand out whole documents and replace them atomically,
/// so a reader never observes a partially applied mutation.
pub trait ConversationStore: Send + Sync {
    /// Load a conversation, `None` when the id does not resolve
    fn load(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Persist a conversation
    ///
    /// The stored revision must equal `conversation.revision` (or the record
    /// must be absent when the revision is 0). Returns the new revision.
    ///
    /// # Errors
    /// Returns [`crate::Error::Conflict`] when another writer got there first
    fn save(&self, conversation: &Conversation) -> Result<u64>;

    /// Every conversation `user_id` takes part in, most recently updated first
    fn query_by_participant(&self, user_id: &str) -> Result<Vec<Conversation>>;

    /// Remove a conversation; removing an absent id is not an error
    fn delete(&self, conversation_id: &str) -> Result<()>;
}

/// Message ownership lookup provided by the message delivery subsystem
pub trait MessageDirectory: Send + Sync {
    /// Conversation a message was delivered to, `None` if unknown
    fn conversation_of(&self, message_id: &str) -> Result<Option<String>>;
}
