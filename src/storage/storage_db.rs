//! SQLite-based storage backend
//!
//! Conversations are stored as JSON documents, with a participant table for
//! lookup by user and an `updated_at` column for recency ordering. Delivered
//! messages are tracked by id so pins can be validated.

use crate::{
    storage::{
        conversation::Conversation,
        store::{ConversationStore, MessageDirectory},
    },
    Error, Result,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-based conversation store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new storage instance with a database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to open database: {}", e)))?;

        Self::with_connection(conn)
    }

    /// Create an in-memory storage instance (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::StoreUnavailable(format!("Failed to create in-memory database: {}", e))
        })?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StoreUnavailable("database connection lock poisoned".to_string()))
    }

    /// Register a delivered message so it can be pinned later
    pub fn record_message(
        &self,
        message_id: &str,
        conversation_id: &str,
        sender_id: &str,
    ) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO messages (id, conversation_id, sender, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                message_id,
                conversation_id,
                sender_id,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Clear all data (for testing)
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM messages", [])?;
        conn.execute("DELETE FROM conversation_participants", [])?;
        conn.execute("DELETE FROM conversations", [])?;
        Ok(())
    }
}

/// Initialize database schema
fn init_schema(conn: &Connection) -> Result<()> {
    // One JSON document per conversation
    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            is_group INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            revision INTEGER NOT NULL,
            document TEXT NOT NULL
        )",
        [],
    )?;

    // Membership index, rewritten with every save
    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        )",
        [],
    )?;

    // Message ownership for pin validation
    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            sender TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_participants_user ON conversation_participants(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
        [],
    )?;

    Ok(())
}

fn decode(document: &str, revision: i64) -> Result<Conversation> {
    let mut conversation: Conversation = serde_json::from_str(document)
        .map_err(|e| Error::Storage(format!("Corrupt conversation document: {}", e)))?;
    conversation.revision = revision as u64;
    Ok(conversation)
}

impl ConversationStore for SqliteStore {
    fn load(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT document, revision FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        row.map(|(document, revision)| decode(&document, revision))
            .transpose()
    }

    fn save(&self, conversation: &Conversation) -> Result<u64> {
        let document = serde_json::to_string(conversation)?;
        let new_revision = conversation.revision + 1;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let written = if conversation.revision == 0 {
            tx.execute(
                "INSERT OR IGNORE INTO conversations (id, is_group, updated_at, revision, document)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &conversation.id,
                    conversation.is_group as i32,
                    conversation.updated_at.timestamp_micros(),
                    new_revision as i64,
                    &document,
                ],
            )?
        } else {
            tx.execute(
                "UPDATE conversations SET updated_at = ?2, revision = ?3, document = ?4
                 WHERE id = ?1 AND revision = ?5",
                params![
                    &conversation.id,
                    conversation.updated_at.timestamp_micros(),
                    new_revision as i64,
                    &document,
                    conversation.revision as i64,
                ],
            )?
        };

        if written == 0 {
            // Dropping the transaction rolls it back
            tracing::warn!(
                "Stale revision {} for conversation {}",
                conversation.revision,
                conversation.id
            );
            return Err(Error::Conflict(conversation.id.clone()));
        }

        tx.execute(
            "DELETE FROM conversation_participants WHERE conversation_id = ?1",
            params![&conversation.id],
        )?;
        for participant in &conversation.participants {
            tx.execute(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                params![&conversation.id, participant],
            )?;
        }

        tx.commit()?;
        Ok(new_revision)
    }

    fn query_by_participant(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.document, c.revision FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?1
             ORDER BY c.updated_at DESC, c.id ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(document, revision)| decode(document, *revision))
            .collect()
    }

    fn delete(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM conversation_participants WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        tx.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![conversation_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl MessageDirectory for SqliteStore {
    fn conversation_of(&self, message_id: &str) -> Result<Option<String>> {
        let owner = self
            .conn()?
            .query_row(
                "SELECT conversation_id FROM messages WHERE id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }
}
