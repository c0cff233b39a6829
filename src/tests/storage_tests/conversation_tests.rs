// Conversation Tests - Testing the Conversation record

use crate::storage::conversation::{DEFAULT_EMOJI, DEFAULT_THEME};
use crate::storage::{Conversation, ConversationStatus};
use crate::Error;

fn direct() -> Conversation {
    Conversation::create(["u1", "u2"], false, None, None).expect("Failed to create direct")
}

fn group_with_admin() -> Conversation {
    Conversation::create(
        ["u1", "u2", "u3"],
        true,
        Some("Weekend".to_string()),
        Some("u1".to_string()),
    )
    .expect("Failed to create group")
}

#[test]
fn test_create_direct_defaults() {
    let chat = direct();

    assert!(!chat.is_group);
    assert_eq!(chat.participants.len(), 2);
    assert!(chat.unread_count.is_empty());
    assert!(chat.archived_by.is_empty());
    assert!(chat.muted_by.is_empty());
    assert!(chat.typing_users.is_empty());
    assert!(chat.pinned_message_ids.is_empty());
    assert_eq!(chat.theme, DEFAULT_THEME);
    assert_eq!(chat.emoji, DEFAULT_EMOJI);
    assert_eq!(chat.status, ConversationStatus::Active);
    assert_eq!(chat.revision, 0);
    assert_eq!(chat.created_at, chat.updated_at);

    for user in ["u1", "u2"] {
        assert_eq!(chat.unread_for(user), 0);
        assert!(!chat.is_archived_by(user));
        assert!(!chat.is_muted_by(user));
    }
}

#[test]
fn test_create_assigns_unique_ids() {
    let a = direct();
    let b = direct();
    assert_ne!(a.id, b.id);
    assert!(uuid::Uuid::parse_str(&a.id).is_ok());
}

#[test]
fn test_create_direct_with_group_name_fails() {
    let result = Conversation::create(["u1", "u2"], false, Some("X".to_string()), None);
    assert!(matches!(result, Err(Error::InvalidParticipants(_))));
}

#[test]
fn test_create_direct_with_admin_fails() {
    let result = Conversation::create(["u1", "u2"], false, None, Some("u1".to_string()));
    assert!(matches!(result, Err(Error::InvalidParticipants(_))));
}

#[test]
fn test_create_direct_needs_exactly_two() {
    let result = Conversation::create(["u1", "u2", "u3"], false, None, None);
    assert!(matches!(result, Err(Error::InvalidParticipants(_))));
}

#[test]
fn test_create_collapses_duplicates() {
    // Two copies of the same user are one participant
    let result = Conversation::create(["u1", "u1"], false, None, None);
    assert!(matches!(result, Err(Error::InvalidParticipants(_))));

    let result = Conversation::create(["u1", "u1", "u2"], true, None, None);
    let group = result.expect("Failed to create group");
    assert_eq!(group.participants.len(), 2);
}

#[test]
fn test_create_group_admin_must_be_participant() {
    let result = Conversation::create(["u1", "u2"], true, None, Some("u9".to_string()));
    assert!(matches!(result, Err(Error::InvalidParticipants(_))));
}

#[test]
fn test_create_group_of_one_fails() {
    let result = Conversation::create(["u1"], true, Some("solo".to_string()), None);
    assert!(matches!(result, Err(Error::InvalidParticipants(_))));
}

#[test]
fn test_record_message_skips_sender() {
    let mut chat = group_with_admin();

    chat.record_incoming_message("u1", "m1").expect("Failed to record");
    chat.record_incoming_message("u1", "m2").expect("Failed to record");
    chat.record_incoming_message("u2", "m3").expect("Failed to record");

    assert_eq!(chat.unread_for("u1"), 1);
    assert_eq!(chat.unread_for("u2"), 2);
    assert_eq!(chat.unread_for("u3"), 3);
    assert_eq!(chat.last_message_id.as_deref(), Some("m3"));
    assert!(chat.updated_at >= chat.created_at);
}

#[test]
fn test_record_message_from_stranger_fails() {
    let mut chat = direct();

    let result = chat.record_incoming_message("u9", "m1");
    assert!(matches!(result, Err(Error::NotParticipant { .. })));
    assert!(chat.last_message_id.is_none());
    assert!(chat.unread_count.is_empty());
}

#[test]
fn test_record_message_clears_sender_typing() {
    let mut chat = direct();
    chat.start_typing("u1").expect("Failed to start typing");

    chat.record_incoming_message("u1", "m1").expect("Failed to record");
    assert!(!chat.typing_users.contains("u1"));
}

#[test]
fn test_direct_scenario_unread_then_read() {
    let mut chat = direct();

    chat.record_incoming_message("u1", "m1").expect("Failed to record");
    assert_eq!(chat.unread_for("u2"), 1);
    assert_eq!(chat.unread_for("u1"), 0);

    assert!(chat.mark_read("u2").expect("Failed to mark read"));
    assert_eq!(chat.unread_for("u2"), 0);
}

#[test]
fn test_mark_read_idempotent() {
    let mut chat = direct();
    chat.record_incoming_message("u1", "m1").expect("Failed to record");

    assert!(chat.mark_read("u2").expect("Failed to mark read"));
    let after_first = chat.clone();

    assert!(!chat.mark_read("u2").expect("Failed to mark read"));
    assert_eq!(chat.unread_for("u2"), 0);
    assert_eq!(chat.updated_at, after_first.updated_at);
}

#[test]
fn test_mark_read_non_participant_fails() {
    let mut chat = direct();
    let result = chat.mark_read("u9");
    assert!(matches!(result, Err(Error::NotParticipant { .. })));
}

#[test]
fn test_archive_and_mute_flags() {
    let mut chat = direct();

    assert!(chat.set_archived("u1", true).expect("Failed to archive"));
    assert!(!chat.set_archived("u1", true).expect("Failed to archive"));
    assert!(chat.is_archived_by("u1"));
    assert!(!chat.is_archived_by("u2"));

    assert!(chat.set_muted("u2", true).expect("Failed to mute"));
    assert!(chat.is_muted_by("u2"));

    assert!(chat.set_archived("u1", false).expect("Failed to unarchive"));
    assert!(!chat.is_archived_by("u1"));
    assert!(!chat.archived_by.contains_key("u1"));

    assert!(!chat.set_muted("u1", false).expect("Failed to unmute"));
}

#[test]
fn test_flags_require_membership() {
    let mut chat = direct();
    assert!(matches!(
        chat.set_archived("u9", true),
        Err(Error::NotParticipant { .. })
    ));
    assert!(matches!(
        chat.set_muted("u9", true),
        Err(Error::NotParticipant { .. })
    ));
}

#[test]
fn test_typing_idempotent() {
    let mut chat = direct();

    assert!(chat.start_typing("u1").expect("Failed to start typing"));
    assert!(!chat.start_typing("u1").expect("Failed to start typing"));
    assert_eq!(chat.typing_users.len(), 1);

    assert!(chat.stop_typing("u1").expect("Failed to stop typing"));
    assert!(!chat.stop_typing("u1").expect("Failed to stop typing"));
    assert!(chat.typing_users.is_empty());
}

#[test]
fn test_add_participant_direct_fails() {
    let mut chat = direct();
    let result = chat.add_participant("u3");
    assert!(matches!(result, Err(Error::NotGroupConversation(_))));
    assert_eq!(chat.participants.len(), 2);
}

#[test]
fn test_remove_participant_direct_fails() {
    let mut chat = direct();
    let result = chat.remove_participant("u1");
    assert!(matches!(result, Err(Error::NotGroupConversation(_))));
}

#[test]
fn test_add_existing_participant_noop() {
    let mut chat = group_with_admin();
    assert!(!chat.add_participant("u2").expect("Failed to add"));
    assert!(chat.add_participant("u4").expect("Failed to add"));
    assert_eq!(chat.participants.len(), 4);
}

#[test]
fn test_remove_participant_purges_state() {
    let mut chat = group_with_admin();
    chat.record_incoming_message("u1", "m1").expect("Failed to record");
    chat.set_archived("u2", true).expect("Failed to archive");
    chat.set_muted("u2", true).expect("Failed to mute");
    chat.start_typing("u2").expect("Failed to start typing");

    assert!(chat.remove_participant("u2").expect("Failed to remove"));

    assert!(!chat.is_participant("u2"));
    assert!(!chat.unread_count.contains_key("u2"));
    assert!(!chat.archived_by.contains_key("u2"));
    assert!(!chat.muted_by.contains_key("u2"));
    assert!(!chat.typing_users.contains("u2"));
    assert!(chat.keys_within_participants());
}

#[test]
fn test_remove_admin_unsets_admin() {
    let mut chat = group_with_admin();

    chat.remove_participant("u1").expect("Failed to remove");

    assert!(chat.admin_id.is_none());
    let remaining: Vec<&str> = chat.participants.iter().map(String::as_str).collect();
    assert_eq!(remaining, vec!["u2", "u3"]);
}

#[test]
fn test_remove_non_member_noop() {
    let mut chat = group_with_admin();
    assert!(!chat.remove_participant("u9").expect("Failed to remove"));
    assert_eq!(chat.participants.len(), 3);
}

#[test]
fn test_remove_last_participant_deletes() {
    let mut chat = group_with_admin();
    for user in ["u1", "u2", "u3"] {
        chat.remove_participant(user).expect("Failed to remove");
    }

    assert!(chat.is_deleted());
    assert!(chat.participants.is_empty());

    assert!(matches!(
        chat.record_incoming_message("u1", "m1"),
        Err(Error::ConversationNotFound(_))
    ));
    assert!(matches!(chat.mark_read("u1"), Err(Error::ConversationNotFound(_))));
    assert!(matches!(chat.pin("m1"), Err(Error::ConversationNotFound(_))));
    assert!(matches!(chat.unpin("m1"), Err(Error::ConversationNotFound(_))));
    assert!(matches!(chat.add_participant("u1"), Err(Error::ConversationNotFound(_))));
    assert!(matches!(chat.remove_participant("u1"), Err(Error::ConversationNotFound(_))));
    assert!(matches!(chat.start_typing("u1"), Err(Error::ConversationNotFound(_))));
    assert!(matches!(chat.set_theme("dark"), Err(Error::ConversationNotFound(_))));
    assert!(matches!(chat.mark_deleted(), Err(Error::ConversationNotFound(_))));
}

#[test]
fn test_pin_and_unpin_idempotent() {
    let mut chat = direct();

    assert!(chat.pin("m1").expect("Failed to pin"));
    assert!(!chat.pin("m1").expect("Failed to pin"));
    assert!(chat.pin("m2").expect("Failed to pin"));
    assert_eq!(chat.pinned_message_ids, vec!["m1", "m2"]);

    assert!(chat.unpin("m1").expect("Failed to unpin"));
    assert!(!chat.unpin("m1").expect("Failed to unpin"));
    assert_eq!(chat.pinned_message_ids, vec!["m2"]);
}

#[test]
fn test_rename_group() {
    let mut chat = group_with_admin();
    assert!(
        chat.rename_group(Some("Trip".to_string()), Some("https://img/trip.png".to_string()))
            .expect("Failed to rename")
    );
    assert_eq!(chat.group_name.as_deref(), Some("Trip"));
    assert_eq!(chat.group_avatar.as_deref(), Some("https://img/trip.png"));

    let mut dm = direct();
    assert!(matches!(
        dm.rename_group(Some("Nope".to_string()), None),
        Err(Error::NotGroupConversation(_))
    ));
}

#[test]
fn test_theme_and_emoji() {
    let mut chat = direct();
    assert!(chat.set_theme("ocean").expect("Failed to set theme"));
    assert!(!chat.set_theme("ocean").expect("Failed to set theme"));
    assert!(chat.set_emoji("🔥").expect("Failed to set emoji"));
    assert_eq!(chat.theme, "ocean");
    assert_eq!(chat.emoji, "🔥");
}

#[test]
fn test_peer_of() {
    let chat = direct();
    assert_eq!(chat.peer_of("u1"), Some("u2"));
    assert_eq!(chat.peer_of("u2"), Some("u1"));
    assert_eq!(chat.peer_of("u9"), None);
    assert_eq!(group_with_admin().peer_of("u1"), None);
}

#[test]
fn test_serialization_skips_typing() {
    let mut chat = group_with_admin();
    chat.start_typing("u2").expect("Failed to start typing");
    chat.record_incoming_message("u3", "m1").expect("Failed to record");

    let json = serde_json::to_string(&chat).expect("Failed to serialize");
    assert!(!json.contains("typing_users"));

    let loaded: Conversation = serde_json::from_str(&json).expect("Failed to deserialize");
    assert!(loaded.typing_users.is_empty());
    assert_eq!(loaded.unread_for("u1"), 1);
    assert_eq!(loaded.admin_id.as_deref(), Some("u1"));
    assert_eq!(loaded.group_name.as_deref(), Some("Weekend"));
}

#[test]
fn test_deserialize_minimal_document() {
    // Documents written before per-user maps existed
    let json = r#"{
        "id": "c1",
        "participants": ["a", "b"],
        "is_group": false,
        "theme": "default",
        "emoji": "👍",
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    }"#;

    let chat: Conversation = serde_json::from_str(json).expect("Failed to deserialize");
    assert_eq!(chat.status, ConversationStatus::Active);
    assert!(chat.unread_count.is_empty());
    assert!(chat.pinned_message_ids.is_empty());
    assert_eq!(chat.revision, 0);
}

#[test]
fn test_unread_count_saturates() {
    let mut chat = direct();
    chat.unread_count.insert("u2".to_string(), u32::MAX);

    chat.record_incoming_message("u1", "m1").expect("Failed to record");

    assert_eq!(chat.unread_for("u2"), u32::MAX);
    assert_eq!(chat.unread_for("u1"), 0);
    assert_eq!(chat.last_message_id.as_deref(), Some("m1"));
}
