//! Typing indicators
//!
//! Indicators live only in process memory and lapse after a timeout even if
//! the client never sends a stop signal. A restart forgets all of them.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Expiring set of typing users per conversation
#[derive(Debug)]
pub struct TypingTracker {
    timeout: Duration,
    entries: Mutex<HashMap<String, HashMap<String, Instant>>>,
}

impl TypingTracker {
    /// Create a tracker whose indicators lapse after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Indicator lifetime
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // Best-effort state: a poisoned lock still holds usable data
    fn entries(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, Instant>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start or refresh a user's indicator
    ///
    /// Returns `true` if the user was not already typing.
    pub fn start(&self, conversation_id: &str, user_id: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        let users = entries.entry(conversation_id.to_string()).or_default();

        let was_typing = users
            .get(user_id)
            .is_some_and(|since| now.duration_since(*since) < self.timeout);
        users.insert(user_id.to_string(), now);
        !was_typing
    }

    /// Clear a user's indicator
    ///
    /// Returns `true` if the user had a live indicator.
    pub fn stop(&self, conversation_id: &str, user_id: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        let Some(users) = entries.get_mut(conversation_id) else {
            return false;
        };

        let was_typing = users
            .remove(user_id)
            .is_some_and(|since| now.duration_since(since) < self.timeout);
        if users.is_empty() {
            entries.remove(conversation_id);
        }
        was_typing
    }

    /// Users with a live indicator, dropping lapsed ones
    pub fn active(&self, conversation_id: &str) -> BTreeSet<String> {
        let now = Instant::now();
        let mut entries = self.entries();
        let Some(users) = entries.get_mut(conversation_id) else {
            return BTreeSet::new();
        };

        users.retain(|_, since| now.duration_since(*since) < self.timeout);
        let active = users.keys().cloned().collect();
        if users.is_empty() {
            entries.remove(conversation_id);
        }
        active
    }

    /// Forget every indicator of a conversation
    pub fn clear_conversation(&self, conversation_id: &str) {
        self.entries().remove(conversation_id);
    }
}
