// Settings Tests - Testing Settings persistence

use crate::storage::Settings;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_settings_default() {
    let settings = Settings::default();

    assert_eq!(settings.storage_path, "./data/letstalk.db");
    assert_eq!(settings.typing_timeout_ms, 5_000);
    assert_eq!(settings.typing_timeout(), Duration::from_secs(5));
    assert_eq!(settings.default_theme, "default");
    assert_eq!(settings.default_emoji, "👍");
    assert_eq!(settings.max_group_participants, 250);
}

#[test]
fn test_settings_save_and_load() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp_file.path();

    let mut settings = Settings::default();
    settings.storage_path = "/var/lib/letstalk/chat.db".to_string();
    settings.typing_timeout_ms = 8_000;
    settings.default_emoji = "❤️".to_string();
    settings.save(path).expect("Failed to save settings");

    let loaded = Settings::load(path).expect("Failed to load settings");

    assert_eq!(loaded.storage_path, "/var/lib/letstalk/chat.db");
    assert_eq!(loaded.typing_timeout_ms, 8_000);
    assert_eq!(loaded.default_emoji, "❤️");
    assert_eq!(loaded.max_group_participants, 250);
}

#[test]
fn test_settings_load_nonexistent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("nonexistent.json");

    let settings = Settings::load(&path).expect("Failed to load settings");
    assert_eq!(settings.typing_timeout_ms, 5_000);
}

#[test]
fn test_settings_load_empty_file() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");

    let settings = Settings::load(temp_file.path()).expect("Failed to load settings");
    assert_eq!(settings.storage_path, "./data/letstalk.db");
}

#[test]
fn test_settings_partial_file_uses_defaults() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(temp_file.path(), r#"{ "max_group_participants": 32 }"#)
        .expect("Failed to write settings");

    let settings = Settings::load(temp_file.path()).expect("Failed to load settings");
    assert_eq!(settings.max_group_participants, 32);
    assert_eq!(settings.typing_timeout_ms, 5_000);
    assert_eq!(settings.default_theme, "default");
}

#[test]
fn test_settings_invalid_json() {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(temp_file.path(), "{ not json").expect("Failed to write settings");

    let result = Settings::load(temp_file.path());
    assert!(matches!(result, Err(crate::Error::Storage(_))));
}

#[test]
fn test_settings_create_parent_directory() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("config").join("settings.json");

    Settings::default().save(&path).expect("Failed to save settings");
    assert!(path.exists());
}
