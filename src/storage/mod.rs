//! Conversation storage module
//!
//! This module handles conversation records and their persistence:
//! - `conversation` - The conversation record and its invariant-preserving operations
//! - `store` - Persistence traits (`ConversationStore`, `MessageDirectory`)
//! - `memory` - In-memory reference store
//! - `storage_db` - SQLite document store
//! - `settings` - Service settings

// Submodules
pub mod conversation;
pub mod memory;
pub mod settings;
pub mod storage_db;
pub mod store;

// Re-export commonly used types
pub use conversation::{Conversation, ConversationStatus};
pub use memory::MemoryStore;
pub use settings::Settings;
pub use storage_db::SqliteStore;
pub use store::{ConversationStore, MessageDirectory};
