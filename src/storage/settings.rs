//! Conversation service settings

use crate::{
    storage::conversation::{DEFAULT_EMOJI, DEFAULT_THEME},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service settings
///
/// Stored in JSON format. Missing fields fall back to their defaults, so
/// older settings files keep loading.
///
/// # Example
/// ```rust,no_run
/// use letstalk::storage::Settings;
///
/// // Load settings (returns default if file doesn't exist)
/// let mut settings = Settings::load("settings.json").expect("Failed to load");
///
/// settings.typing_timeout_ms = 8_000;
/// settings.save("settings.json").expect("Failed to save");
///
/// println!("Database: {}", settings.storage_path);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path of the SQLite database file
    pub storage_path: String,
    /// How long a typing indicator survives without a refresh
    pub typing_timeout_ms: u64,
    /// Theme given to new conversations
    pub default_theme: String,
    /// Quick-reaction emoji given to new conversations
    pub default_emoji: String,
    /// Upper bound on group membership
    pub max_group_participants: usize,
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// # Returns
    /// The loaded settings, or default settings if file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Storage(format!("Failed to read settings: {}", e)))?;

        // Handle empty file (return defaults)
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Storage(format!("Failed to parse settings: {}", e)))?;

        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Storage(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Typing indicator lifetime
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_path: "./data/letstalk.db".to_string(),
            typing_timeout_ms: 5_000,
            default_theme: DEFAULT_THEME.to_string(),
            default_emoji: DEFAULT_EMOJI.to_string(),
            max_group_participants: 250,
        }
    }
}
