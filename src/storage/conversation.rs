//! Conversation records and their per-participant state

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Theme applied to new conversations when settings don't override it
pub const DEFAULT_THEME: &str = "default";

/// Quick-reaction emoji applied to new conversations when settings don't override it
pub const DEFAULT_EMOJI: &str = "👍";

/// Lifecycle of a conversation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationStatus {
    /// Conversation accepts operations
    Active,
    /// Terminal state, reached by explicit delete or last-participant removal
    Deleted,
}

impl Default for ConversationStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// A chat thread between two or more users
///
/// Per-participant maps only ever hold keys that are current participants.
/// A participant missing from a map has the default value (0 unread, not
/// archived, not muted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque unique identifier
    pub id: String,
    /// Current members
    pub participants: BTreeSet<String>,
    /// Group or direct conversation, fixed at creation
    pub is_group: bool,
    /// Display name of a group
    #[serde(default)]
    pub group_name: Option<String>,
    /// Avatar URL of a group
    #[serde(default)]
    pub group_avatar: Option<String>,
    /// Group administrator, always a participant when set
    #[serde(default)]
    pub admin_id: Option<String>,
    /// Most recently recorded message
    #[serde(default)]
    pub last_message_id: Option<String>,
    /// Unread messages per participant
    #[serde(default)]
    pub unread_count: BTreeMap<String, u32>,
    /// Participants that archived this conversation
    #[serde(default)]
    pub archived_by: BTreeMap<String, bool>,
    /// Participants that muted this conversation
    #[serde(default)]
    pub muted_by: BTreeMap<String, bool>,
    /// Participants currently composing a message (never persisted)
    #[serde(skip)]
    pub typing_users: BTreeSet<String>,
    /// Pinned messages in pin order
    #[serde(default)]
    pub pinned_message_ids: Vec<String>,
    /// Display theme
    pub theme: String,
    /// Quick-reaction emoji
    pub emoji: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Lifecycle state
    #[serde(default)]
    pub status: ConversationStatus,
    /// Store revision this record was loaded at (0 if never saved)
    #[serde(default)]
    pub revision: u64,
}

impl Conversation {
    /// Create a new conversation
    ///
    /// Duplicate ids collapse. A direct conversation needs exactly two
    /// distinct participants and no group name or admin; a group needs at
    /// least two, and its admin (if any) must be one of them.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParticipants`] when those rules are violated
    pub fn create<I, S>(
        participant_ids: I,
        is_group: bool,
        group_name: Option<String>,
        admin_id: Option<String>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let participants: BTreeSet<String> =
            participant_ids.into_iter().map(Into::into).collect();

        if participants.len() < 2 {
            return Err(Error::InvalidParticipants(format!(
                "a conversation needs at least 2 distinct participants, got {}",
                participants.len()
            )));
        }

        if is_group {
            if let Some(admin) = &admin_id {
                if !participants.contains(admin) {
                    return Err(Error::InvalidParticipants(format!(
                        "admin {} is not a participant",
                        admin
                    )));
                }
            }
        } else {
            if participants.len() != 2 {
                return Err(Error::InvalidParticipants(format!(
                    "a direct conversation needs exactly 2 participants, got {}",
                    participants.len()
                )));
            }
            if group_name.is_some() || admin_id.is_some() {
                return Err(Error::InvalidParticipants(
                    "group name and admin are only allowed on group conversations".to_string(),
                ));
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            participants,
            is_group,
            group_name,
            group_avatar: None,
            admin_id,
            last_message_id: None,
            unread_count: BTreeMap::new(),
            archived_by: BTreeMap::new(),
            muted_by: BTreeMap::new(),
            typing_users: BTreeSet::new(),
            pinned_message_ids: Vec::new(),
            theme: DEFAULT_THEME.to_string(),
            emoji: DEFAULT_EMOJI.to_string(),
            created_at: now,
            updated_at: now,
            status: ConversationStatus::Active,
            revision: 0,
        })
    }

    /// Whether the conversation reached its terminal state
    pub fn is_deleted(&self) -> bool {
        self.status == ConversationStatus::Deleted
    }

    /// Whether `user_id` is a current participant
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.contains(user_id)
    }

    /// Unread count of a participant (0 when absent)
    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_count.get(user_id).copied().unwrap_or(0)
    }

    /// Whether a participant archived this conversation
    pub fn is_archived_by(&self, user_id: &str) -> bool {
        self.archived_by.get(user_id).copied().unwrap_or(false)
    }

    /// Whether a participant muted this conversation
    pub fn is_muted_by(&self, user_id: &str) -> bool {
        self.muted_by.get(user_id).copied().unwrap_or(false)
    }

    /// The other member of a direct conversation
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        if self.is_group || !self.is_participant(user_id) {
            return None;
        }
        self.participants
            .iter()
            .find(|p| p.as_str() != user_id)
            .map(String::as_str)
    }

    /// Record a message sent by `sender_id`
    ///
    /// Every other participant gets one more unread message. The sender's
    /// count is left alone and its typing indicator is cleared.
    pub fn record_incoming_message(&mut self, sender_id: &str, message_id: &str) -> Result<()> {
        self.ensure_participant(sender_id)?;

        for participant in self.participants.iter().filter(|p| p.as_str() != sender_id) {
            let count = self.unread_count.entry(participant.clone()).or_insert(0);
            *count = count.saturating_add(1);
        }
        self.typing_users.remove(sender_id);
        self.last_message_id = Some(message_id.to_string());
        self.touch();
        Ok(())
    }

    /// Reset a participant's unread count
    ///
    /// Returns whether anything changed.
    pub fn mark_read(&mut self, user_id: &str) -> Result<bool> {
        self.ensure_participant(user_id)?;

        if self.unread_for(user_id) == 0 {
            return Ok(false);
        }
        self.unread_count.insert(user_id.to_string(), 0);
        self.touch();
        Ok(true)
    }

    /// Set or clear a participant's archive flag
    pub fn set_archived(&mut self, user_id: &str, archived: bool) -> Result<bool> {
        self.ensure_participant(user_id)?;
        let changed = set_flag(&mut self.archived_by, user_id, archived);
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    /// Set or clear a participant's mute flag
    pub fn set_muted(&mut self, user_id: &str, muted: bool) -> Result<bool> {
        self.ensure_participant(user_id)?;
        let changed = set_flag(&mut self.muted_by, user_id, muted);
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    /// Mark a participant as typing
    pub fn start_typing(&mut self, user_id: &str) -> Result<bool> {
        self.ensure_participant(user_id)?;
        Ok(self.typing_users.insert(user_id.to_string()))
    }

    /// Clear a participant's typing indicator
    pub fn stop_typing(&mut self, user_id: &str) -> Result<bool> {
        self.ensure_participant(user_id)?;
        Ok(self.typing_users.remove(user_id))
    }

    /// Add a member to a group conversation
    ///
    /// Adding an existing participant is a no-op.
    pub fn add_participant(&mut self, user_id: &str) -> Result<bool> {
        self.ensure_group()?;

        if !self.participants.insert(user_id.to_string()) {
            return Ok(false);
        }
        self.touch();
        Ok(true)
    }

    /// Remove a member from a group conversation
    ///
    /// Purges the member from every per-participant map and the typing set,
    /// and unsets the admin if it was the admin. Removing the last member
    /// moves the conversation to [`ConversationStatus::Deleted`]. Removing a
    /// non-member is a no-op.
    pub fn remove_participant(&mut self, user_id: &str) -> Result<bool> {
        self.ensure_group()?;

        if !self.participants.remove(user_id) {
            return Ok(false);
        }

        self.unread_count.remove(user_id);
        self.archived_by.remove(user_id);
        self.muted_by.remove(user_id);
        self.typing_users.remove(user_id);
        if self.admin_id.as_deref() == Some(user_id) {
            self.admin_id = None;
        }
        if self.participants.is_empty() {
            self.status = ConversationStatus::Deleted;
        }
        self.touch();
        Ok(true)
    }

    /// Pin a message already validated as belonging to this conversation
    pub fn pin(&mut self, message_id: &str) -> Result<bool> {
        self.ensure_active()?;

        if self.pinned_message_ids.iter().any(|m| m == message_id) {
            return Ok(false);
        }
        self.pinned_message_ids.push(message_id.to_string());
        self.touch();
        Ok(true)
    }

    /// Unpin a message
    pub fn unpin(&mut self, message_id: &str) -> Result<bool> {
        self.ensure_active()?;

        let before = self.pinned_message_ids.len();
        self.pinned_message_ids.retain(|m| m != message_id);
        if self.pinned_message_ids.len() == before {
            return Ok(false);
        }
        self.touch();
        Ok(true)
    }

    /// Change the name and avatar of a group
    pub fn rename_group(
        &mut self,
        group_name: Option<String>,
        group_avatar: Option<String>,
    ) -> Result<bool> {
        self.ensure_group()?;

        if self.group_name == group_name && self.group_avatar == group_avatar {
            return Ok(false);
        }
        self.group_name = group_name;
        self.group_avatar = group_avatar;
        self.touch();
        Ok(true)
    }

    /// Change the display theme
    pub fn set_theme(&mut self, theme: &str) -> Result<bool> {
        self.ensure_active()?;
        if self.theme == theme {
            return Ok(false);
        }
        self.theme = theme.to_string();
        self.touch();
        Ok(true)
    }

    /// Change the quick-reaction emoji
    pub fn set_emoji(&mut self, emoji: &str) -> Result<bool> {
        self.ensure_active()?;
        if self.emoji == emoji {
            return Ok(false);
        }
        self.emoji = emoji.to_string();
        self.touch();
        Ok(true)
    }

    /// Move the conversation to its terminal state
    pub fn mark_deleted(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = ConversationStatus::Deleted;
        self.touch();
        Ok(())
    }

    /// Whether every per-participant key belongs to a current participant
    pub fn keys_within_participants(&self) -> bool {
        self.unread_count.keys().all(|k| self.participants.contains(k))
            && self.archived_by.keys().all(|k| self.participants.contains(k))
            && self.muted_by.keys().all(|k| self.participants.contains(k))
            && self.typing_users.iter().all(|k| self.participants.contains(k))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::ConversationNotFound(self.id.clone()));
        }
        Ok(())
    }

    fn ensure_participant(&self, user_id: &str) -> Result<()> {
        self.ensure_active()?;
        if !self.is_participant(user_id) {
            return Err(Error::NotParticipant {
                conversation_id: self.id.clone(),
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_group(&self) -> Result<()> {
        self.ensure_active()?;
        if !self.is_group {
            return Err(Error::NotGroupConversation(self.id.clone()));
        }
        Ok(())
    }
}

/// Absent entries mean `false`, so clearing a flag drops the key
fn set_flag(flags: &mut BTreeMap<String, bool>, user_id: &str, value: bool) -> bool {
    let current = flags.get(user_id).copied().unwrap_or(false);
    if current == value {
        return false;
    }
    if value {
        flags.insert(user_id.to_string(), true);
    } else {
        flags.remove(user_id);
    }
    true
}
