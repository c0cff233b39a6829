//! Lets_Talk inspector
//!
//! Opens the configured conversation database and prints a user's inbox.
//!
//! Usage: `letstalk-inspect <user-id> [--archived]`
//! The settings file is read from `LETSTALK_SETTINGS` (default `settings.json`).

use anyhow::{bail, Context};
use letstalk::conversations::ConversationService;
use letstalk::storage::{Settings, SqliteStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    letstalk::init();

    let mut args = std::env::args().skip(1);
    let Some(user_id) = args.next() else {
        bail!("usage: letstalk-inspect <user-id> [--archived]");
    };
    let show_archived = args.any(|a| a == "--archived");

    let settings_path =
        std::env::var("LETSTALK_SETTINGS").unwrap_or_else(|_| "settings.json".to_string());
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path))?;

    tracing::info!("Opening conversation database at {}", settings.storage_path);
    let store = Arc::new(
        SqliteStore::new(&settings.storage_path)
            .with_context(|| format!("opening {}", settings.storage_path))?,
    );
    let service = ConversationService::new(store.clone(), store, settings);

    let conversations = if show_archived {
        service.archived(&user_id).await?
    } else {
        service.inbox(&user_id).await?
    };

    for conversation in &conversations {
        let title = match (&conversation.group_name, conversation.peer_of(&user_id)) {
            (Some(name), _) => name.clone(),
            (None, Some(peer)) => peer.to_string(),
            (None, None) => conversation.participants.iter().cloned().collect::<Vec<_>>().join(", "),
        };
        println!(
            "{}  {:<32} unread={:<4}{} updated={}",
            conversation.id,
            title,
            conversation.unread_for(&user_id),
            if conversation.is_muted_by(&user_id) { " muted" } else { "" },
            conversation.updated_at.to_rfc3339(),
        );
    }

    println!(
        "{} conversation(s), {} unread",
        conversations.len(),
        service.total_unread(&user_id).await?
    );
    Ok(())
}
