//! A member's recent matches, checked against the match-history channel.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serenity::all::{GuildId, UserId};
use tracing::{info, warn};

use crate::error::QueueError;
use crate::model::{MatchRecord, MatchResult};
use crate::platform::{Card, Platform, COLOUR_BLUE};
use crate::store::{MatchFilter, Store};

/// Number of newest records scanned for a member's history.
pub const HISTORY_SCAN: u64 = 50;

/// Matches `user` played among the newest records, newest first.
///
/// Records whose log message is missing from the history channel are
/// treated as stale and deleted from the store. A record whose log cannot be
/// checked right now is kept.
pub async fn recent_matches(
    store: &dyn Store,
    platform: &dyn Platform,
    user: UserId,
) -> Result<Vec<MatchRecord>, QueueError> {
    let records = store
        .query_match_records(MatchFilter {
            player: Some(user),
            scan_limit: Some(HISTORY_SCAN),
            ..Default::default()
        })
        .await?;

    let mut valid = Vec::with_capacity(records.len());
    for record in records {
        let live = match record.log {
            Some(log) => match platform.message_exists(log).await {
                Ok(live) => live,
                Err(e) => {
                    warn!(record = record.id, "could not check match log, keeping record: {}", e);
                    valid.push(record);
                    continue;
                }
            },
            None => false,
        };
        if live {
            valid.push(record);
            continue;
        }
        match store.delete_match_record(record.id).await {
            Ok(()) => info!(record = record.id, "removed match record with missing log message"),
            Err(e) => warn!(record = record.id, "could not remove stale match record: {}", e),
        }
    }
    Ok(valid)
}

pub fn history_card(name: &str, records: &[MatchRecord], guild_id: GuildId) -> Card {
    let description = if records.is_empty() {
        "_No valid match logs found._".to_owned()
    } else {
        records
            .iter()
            .map(|r| {
                let emoji = match r.result {
                    MatchResult::Win => "✅",
                    MatchResult::Loss => "❌",
                };
                let time = DateTime::<Utc>::from_timestamp_millis(r.finished_at)
                    .map(|t| t.format("%m/%d/%Y %H:%M:%S").to_string())
                    .unwrap_or_default();
                let link = r
                    .log
                    .map(|log| format!(" → [View Match]({})", log.link(guild_id)))
                    .unwrap_or_default();
                format!("{emoji} {} — {time}{link}", r.kind.label())
            })
            .join("\n")
    };
    Card::new(format!("{name}'s Recent Matches"), description, COLOUR_BLUE)
        .footer(Some("Automatically synced with #match-history".to_owned()))
}
