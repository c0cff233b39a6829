//! Lets_Talk - conversation state for the Lets_Talk messaging backend
//!
//! This library owns the per-conversation record of the chat feature:
//! participants, unread counts, archive and mute flags, typing indicators
//! and pinned messages. Persistence, message delivery and identity are
//! external collaborators reached through the traits in [`storage::store`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conversations;
pub mod storage;
pub mod typing;

/// Result type alias for Lets_Talk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Lets_Talk operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The conversation id does not resolve, or the conversation was deleted
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// Participant set violates the direct/group rules
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),

    /// Acting user is not a member of the conversation
    #[error("User {user_id} is not a participant of conversation {conversation_id}")]
    NotParticipant {
        /// Conversation the operation targeted
        conversation_id: String,
        /// User that is not a member
        user_id: String,
    },

    /// Operation is only valid on group conversations
    #[error("Conversation {0} is not a group conversation")]
    NotGroupConversation(String),

    /// Message is unknown or owned by another conversation
    #[error("Message {message_id} does not belong to conversation {conversation_id}")]
    MessageNotInConversation {
        /// Conversation the pin targeted
        conversation_id: String,
        /// Message that failed validation
        message_id: String,
    },

    /// Persistence store cannot serve the request right now
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored revision changed since the record was loaded
    #[error("Write conflict on conversation {0}")]
    Conflict(String),

    /// Storage operation error
    #[error("Storage error: {0}")]
    Storage(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Whether the calling layer may retry the operation with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) | Error::Conflict(_) => true,
            Error::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Conversation id the error refers to, if any
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Error::ConversationNotFound(id)
            | Error::NotGroupConversation(id)
            | Error::Conflict(id) => Some(id),
            Error::NotParticipant { conversation_id, .. }
            | Error::MessageNotInConversation { conversation_id, .. } => Some(conversation_id),
            _ => None,
        }
    }
}

/// Initialize the Lets_Talk library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}
