//! The two persistent messages the bot keeps up to date: the queue summary
//! and the leaderboard.

use std::sync::Arc;

use itertools::Itertools;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::model::{MessageRef, QueueEntry};
use crate::platform::{Card, Platform, COLOUR_BLUE};
use crate::settings::{Settings, SettingsStore};
use crate::stats::{leaderboard, leaderboard_card};
use crate::store::{MatchFilter, Store};

pub struct Boards {
    settings: Arc<SettingsStore>,
    store: Arc<dyn Store>,
    platform: Arc<dyn Platform>,
    queue_lock: Mutex<()>,
    leaderboard_lock: Mutex<()>,
}

impl Boards {
    pub fn new(
        settings: Arc<SettingsStore>,
        store: Arc<dyn Store>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            settings,
            store,
            platform,
            queue_lock: Mutex::new(()),
            leaderboard_lock: Mutex::new(()),
        }
    }

    /// Re-renders the queue summary, with an optional countdown footer.
    pub async fn refresh_queue(&self, footer: Option<String>) -> Result<(), QueueError> {
        let _serialized = self.queue_lock.lock().await;
        let settings = self.settings.snapshot();
        let Some(channel_id) = settings.queue_message_channel_id else {
            debug!("no queue message channel configured; skipping summary");
            return Ok(());
        };
        let entries = self.store.list_queue_entries().await?;
        let card = queue_card(&settings, &entries, footer);

        if let Some(message_id) = settings.queue_message_id {
            let existing = MessageRef {
                channel_id,
                message_id,
            };
            match self.platform.edit_message(existing, card.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(message = %message_id, "queue summary is gone, reposting: {}", e),
            }
        }

        let posted = self.platform.post_message(channel_id, card).await?;
        self.settings
            .update(|s| s.queue_message_id = Some(posted.message_id))?;
        info!(message = %posted.message_id, "posted new queue summary");
        Ok(())
    }

    /// Re-renders the persistent leaderboard from match history.
    pub async fn refresh_leaderboard(&self) -> Result<(), QueueError> {
        let _serialized = self.leaderboard_lock.lock().await;
        let settings = self.settings.snapshot();
        let Some(channel_id) = settings.leaderboard_channel_id else {
            warn!("leaderboard channel not configured");
            return Ok(());
        };
        let records = self
            .store
            .query_match_records(MatchFilter::default())
            .await?;
        let rows = leaderboard(
            &records,
            settings.leaderboard_filter,
            settings.leaderboard_sort,
        );
        let card = leaderboard_card(&rows, settings.leaderboard_filter);

        if let Some(message_id) = settings.leaderboard_message_id {
            let existing = MessageRef {
                channel_id,
                message_id,
            };
            match self.platform.edit_message(existing, card.clone()).await {
                Ok(()) => {
                    debug!("updated leaderboard");
                    return Ok(());
                }
                Err(e) => warn!(message = %message_id, "leaderboard message is gone, reposting: {}", e),
            }
        }

        let posted = self.platform.post_message(channel_id, card).await?;
        self.settings
            .update(|s| s.leaderboard_message_id = Some(posted.message_id))?;
        info!(message = %posted.message_id, "created new persistent leaderboard message");
        Ok(())
    }
}

fn mention_channels(ids: &[serenity::all::ChannelId]) -> String {
    if ids.is_empty() {
        "_None_".to_owned()
    } else {
        ids.iter().map(|c| format!("<#{c}>")).join(", ")
    }
}

pub fn queue_card(settings: &Settings, entries: &[QueueEntry], footer: Option<String>) -> Card {
    let waiting = settings
        .waiting_channel_id
        .map(|c| format!("<#{c}>"))
        .unwrap_or_else(|| "_not configured_".to_owned());
    let queue = if entries.is_empty() {
        "_No one in queue._".to_owned()
    } else {
        entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}. <@{}>", i + 1, e.user_id))
            .join("\n")
    };
    let description = format!(
        "Pulling members from {waiting} →\n\n**5Q Channels:** {}\n**Trio Channels:** {}\n\n**Queue ({}/{})**\n{queue}",
        mention_channels(&settings.five_stack_channel_ids),
        mention_channels(&settings.trio_channel_ids),
        entries.len(),
        settings.queue_size,
    );
    Card::new("🎮 Ranked Queue", description, COLOUR_BLUE).footer(footer)
}
