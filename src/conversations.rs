//! High-level conversation service
//!
//! This module combines the conversation model, a persistence store and the
//! message directory into the operations the API layer calls. Mutations of
//! one conversation are serialized through a per-id async lock held across
//! the whole load, mutate and save cycle; different conversations proceed in
//! parallel. Reads take no lock and see whole documents.
//!
//! # Example
//! ```rust,no_run
//! use letstalk::conversations::ConversationService;
//! use letstalk::storage::{MemoryStore, Settings};
//! use std::sync::Arc;
//!
//! # async fn example() -> letstalk::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let service = ConversationService::new(store.clone(), store.clone(), Settings::default());
//!
//! let chat = service.create(["alice", "bob"], false, None, None).await?;
//! service.record_incoming_message(&chat.id, "alice", "msg_1").await?;
//!
//! let chat = service.fetch(&chat.id).await?;
//! assert_eq!(chat.unread_for("bob"), 1);
//!
//! service.mark_read(&chat.id, "bob").await?;
//! # Ok(())
//! # }
//! ```

use crate::{
    storage::{Conversation, ConversationStore, MessageDirectory, Settings},
    typing::TypingTracker,
    Error, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type LockTable = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Conversation operations over a shared store
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageDirectory>,
    typing: Arc<TypingTracker>,
    settings: Arc<Settings>,
    locks: Arc<Mutex<LockTable>>,
}

impl ConversationService {
    /// Create a service over a conversation store and a message directory
    pub fn new(
        store: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageDirectory>,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            messages,
            typing: Arc::new(TypingTracker::new(settings.typing_timeout())),
            settings: Arc::new(settings),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Settings the service was built with
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, LockTable> {
        // The table only maps ids to mutexes; a poisoned guard is still consistent
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.lock_table()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn forget_lock(&self, key: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut table = self.lock_table();
        // Only the table and the caller hold it: nobody is waiting
        if Arc::strong_count(lock) <= 2 {
            table.remove(key);
        }
    }

    /// Run `f` while holding the lock for `key`, then prune the entry
    async fn serialized<T, F, Fut>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let lock = self.lock_for(key);
        let guard = lock.lock().await;
        let result = f().await;
        drop(guard);
        self.forget_lock(key, &lock);
        result
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.lock_table().len()
    }

    fn load_active(&self, conversation_id: &str) -> Result<Conversation> {
        match self.store.load(conversation_id)? {
            Some(conversation) if !conversation.is_deleted() => Ok(conversation),
            _ => Err(Error::ConversationNotFound(conversation_id.to_string())),
        }
    }

    fn with_typing(&self, mut conversation: Conversation) -> Conversation {
        conversation.typing_users = self
            .typing
            .active(&conversation.id)
            .into_iter()
            .filter(|u| conversation.is_participant(u))
            .collect();
        conversation
    }

    /// Run one serialized load, mutate and save cycle
    ///
    /// `apply` reports whether it changed anything; unchanged records are not
    /// written back. A record that reaches the deleted state is removed from
    /// the store.
    async fn mutate<F>(&self, conversation_id: &str, apply: F) -> Result<Conversation>
    where
        F: FnOnce(&mut Conversation) -> Result<bool>,
    {
        self.serialized(conversation_id, move || async move {
            let mut conversation = self.load_active(conversation_id)?;
            if !apply(&mut conversation)? {
                return Ok(conversation);
            }

            if conversation.is_deleted() {
                self.store.delete(conversation_id)?;
                self.typing.clear_conversation(conversation_id);
                tracing::info!("Conversation {} deleted", conversation_id);
                return Ok(conversation);
            }

            conversation.revision = self.store.save(&conversation).inspect_err(|e| {
                tracing::warn!("Failed to save conversation {}: {}", conversation_id, e);
            })?;
            Ok(conversation)
        })
        .await
    }

    /// Start a direct conversation or form a group
    ///
    /// Every call creates a new record, direct pairs included; use
    /// [`ConversationService::open_direct`] to reuse an existing one.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParticipants`] when the direct/group rules are
    /// violated or the group exceeds `max_group_participants`
    pub async fn create<I, S>(
        &self,
        participant_ids: I,
        is_group: bool,
        group_name: Option<String>,
        admin_id: Option<String>,
    ) -> Result<Conversation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut conversation =
            Conversation::create(participant_ids, is_group, group_name, admin_id)?;

        if conversation.participants.len() > self.settings.max_group_participants {
            return Err(Error::InvalidParticipants(format!(
                "a group holds at most {} participants, got {}",
                self.settings.max_group_participants,
                conversation.participants.len()
            )));
        }

        conversation.theme = self.settings.default_theme.clone();
        conversation.emoji = self.settings.default_emoji.clone();
        conversation.revision = self.store.save(&conversation)?;

        tracing::info!(
            "Created {} conversation {} with {} participants",
            if is_group { "group" } else { "direct" },
            conversation.id,
            conversation.participants.len()
        );
        Ok(conversation)
    }

    /// Fetch a conversation for display, including live typing indicators
    pub async fn fetch(&self, conversation_id: &str) -> Result<Conversation> {
        let conversation = self.load_active(conversation_id)?;
        Ok(self.with_typing(conversation))
    }

    /// Record a delivered message
    ///
    /// Called once per message by the delivery subsystem; it must not be
    /// retried after a confirmed success.
    pub async fn record_incoming_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        message_id: &str,
    ) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| {
                c.record_incoming_message(sender_id, message_id)?;
                Ok(true)
            })
            .await?;

        self.typing.stop(conversation_id, sender_id);
        tracing::debug!(
            "Recorded message {} from {} in {}",
            message_id,
            sender_id,
            conversation_id
        );
        Ok(self.with_typing(conversation))
    }

    /// Reset a participant's unread count
    pub async fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.mark_read(user_id))
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Archive or unarchive a conversation for one participant
    pub async fn set_archived(
        &self,
        conversation_id: &str,
        user_id: &str,
        archived: bool,
    ) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.set_archived(user_id, archived))
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Mute or unmute a conversation for one participant
    pub async fn set_muted(
        &self,
        conversation_id: &str,
        user_id: &str,
        muted: bool,
    ) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.set_muted(user_id, muted))
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Show a participant as typing until stopped or timed out
    pub async fn start_typing(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let mut conversation = self.load_active(conversation_id)?;
        conversation.start_typing(user_id)?;
        self.typing.start(conversation_id, user_id);
        Ok(())
    }

    /// Clear a participant's typing indicator
    pub async fn stop_typing(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let mut conversation = self.load_active(conversation_id)?;
        conversation.stop_typing(user_id)?;
        self.typing.stop(conversation_id, user_id);
        Ok(())
    }

    /// Add a member to a group
    pub async fn add_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation> {
        let max = self.settings.max_group_participants;
        let conversation = self
            .mutate(conversation_id, |c| {
                if c.is_group && !c.is_participant(user_id) && c.participants.len() >= max {
                    return Err(Error::InvalidParticipants(format!(
                        "group {} is full ({} participants)",
                        c.id, max
                    )));
                }
                c.add_participant(user_id)
            })
            .await?;

        tracing::info!("User {} is a member of {}", user_id, conversation_id);
        Ok(self.with_typing(conversation))
    }

    /// Remove a member from a group
    ///
    /// The returned record is in the deleted state when the last member left.
    pub async fn remove_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.remove_participant(user_id))
            .await?;

        self.typing.stop(conversation_id, user_id);
        tracing::info!("User {} left {}", user_id, conversation_id);
        Ok(self.with_typing(conversation))
    }

    /// Pin a message of this conversation
    ///
    /// # Errors
    /// Returns [`Error::MessageNotInConversation`] unless the message
    /// directory reports the message as delivered to this conversation
    pub async fn pin(&self, conversation_id: &str, message_id: &str) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| {
                match self.messages.conversation_of(message_id)? {
                    Some(owner) if owner == c.id => c.pin(message_id),
                    _ => {
                        tracing::warn!(
                            "Rejected pin of {} in {}: message not in conversation",
                            message_id,
                            c.id
                        );
                        Err(Error::MessageNotInConversation {
                            conversation_id: c.id.clone(),
                            message_id: message_id.to_string(),
                        })
                    }
                }
            })
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Unpin a message
    pub async fn unpin(&self, conversation_id: &str, message_id: &str) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.unpin(message_id))
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Change a group's name and avatar
    pub async fn rename_group(
        &self,
        conversation_id: &str,
        group_name: Option<String>,
        group_avatar: Option<String>,
    ) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.rename_group(group_name, group_avatar))
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Change the display theme
    pub async fn set_theme(&self, conversation_id: &str, theme: &str) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.set_theme(theme))
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Change the quick-reaction emoji
    pub async fn set_emoji(&self, conversation_id: &str, emoji: &str) -> Result<Conversation> {
        let conversation = self
            .mutate(conversation_id, |c| c.set_emoji(emoji))
            .await?;
        Ok(self.with_typing(conversation))
    }

    /// Delete a conversation for everyone
    pub async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.mutate(conversation_id, |c| {
            c.mark_deleted()?;
            Ok(true)
        })
        .await?;
        Ok(())
    }

    /// Every conversation of a user, most recently updated first
    pub async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conversations = self.store.query_by_participant(user_id)?;
        Ok(conversations
            .into_iter()
            .filter(|c| !c.is_deleted())
            .map(|c| self.with_typing(c))
            .collect())
    }

    /// Conversations the user has not archived
    pub async fn inbox(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut conversations = self.conversations_for(user_id).await?;
        conversations.retain(|c| !c.is_archived_by(user_id));
        Ok(conversations)
    }

    /// Conversations the user has archived
    pub async fn archived(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut conversations = self.conversations_for(user_id).await?;
        conversations.retain(|c| c.is_archived_by(user_id));
        Ok(conversations)
    }

    /// Unread messages across the user's conversations, muted ones excluded
    pub async fn total_unread(&self, user_id: &str) -> Result<u64> {
        let conversations = self.store.query_by_participant(user_id)?;
        Ok(conversations
            .iter()
            .filter(|c| !c.is_muted_by(user_id))
            .map(|c| c.unread_for(user_id) as u64)
            .sum())
    }

    /// The direct conversation between two users, if any
    pub async fn find_direct(&self, user_a: &str, user_b: &str) -> Result<Option<Conversation>> {
        let conversations = self.store.query_by_participant(user_a)?;
        Ok(conversations
            .into_iter()
            .find(|c| !c.is_group && !c.is_deleted() && c.is_participant(user_b))
            .map(|c| self.with_typing(c)))
    }

    /// The direct conversation between two users, created when missing
    pub async fn open_direct(&self, user_a: &str, user_b: &str) -> Result<Conversation> {
        let (low, high) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        let key = format!("direct:{}:{}", low, high);
        self.serialized(&key, move || async move {
            match self.find_direct(user_a, user_b).await? {
                Some(existing) => Ok(existing),
                None => self.create([user_a, user_b], false, None, None).await,
            }
        })
        .await
    }
}
