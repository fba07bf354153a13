use anyhow::{ensure, Result};
use itertools::Itertools;
use poise::serenity_prelude::{ChannelId, GuildChannel, RoleId};
use tracing::info;

use crate::discord_helpers::send_card;
use crate::helpers::parse_id_list;
use crate::platform::{Card, COLOUR_BLUE};
use crate::settings::Settings;
use crate::types::{Context, Data};

fn channel(id: Option<ChannelId>) -> String {
    id.map(|c| format!("<#{c}>"))
        .unwrap_or_else(|| "*(not set)*".to_owned())
}

fn channel_list(ids: &[ChannelId]) -> String {
    if ids.is_empty() {
        "*(none)*".to_owned()
    } else {
        ids.iter().map(|c| format!("<#{c}>")).join(", ")
    }
}

fn settings_card(s: &Settings) -> Card {
    let roles = if s.allowed_role_ids.is_empty() {
        "*(none)*".to_owned()
    } else {
        s.allowed_role_ids.iter().map(|r| format!("<@&{r}>")).join(", ")
    };
    let description = [
        format!("**Waiting Channel:** {}", channel(s.waiting_channel_id)),
        format!("**Lobby Channel:** {}", channel(s.lobby_channel())),
        format!("**Queue Message Channel:** {}", channel(s.queue_message_channel_id)),
        format!("**5Q Channels:** {}", channel_list(&s.five_stack_channel_ids)),
        format!("**Trio Channels:** {}", channel_list(&s.trio_channel_ids)),
        format!("**Match History Channel:** {}", channel(s.match_history_channel_id)),
        format!("**Leaderboard Channel:** {}", channel(s.leaderboard_channel_id)),
        format!("**Queue Size:** {}", s.queue_size),
        format!("**Allowed Roles:** {roles}"),
        format!(
            "**Trio Countdown:** {}s (tick {}s)",
            s.trio_countdown_secs, s.countdown_tick_secs
        ),
        format!("**Match Card Deletion:** {} min", s.match_delete_delay_minutes),
        format!("**Active Matches:** {}", s.active_matches.len()),
    ]
    .join("\n");
    Card::new("⚙️ Queue Configuration", description, COLOUR_BLUE)
}

async fn handle_queue_size(data: &Data, size: usize) -> Result<String> {
    ensure!(size >= 2, "Queue size must be at least 2.");
    data.settings.update(|s| s.queue_size = size)?;
    data.boards.refresh_queue(data.watcher.countdown_footer()).await?;
    Ok(format!("✅ Queue size updated to **{size}**."))
}

async fn handle_roles(data: &Data, roles: String) -> Result<String> {
    let ids: Vec<RoleId> = parse_id_list(&roles)?;
    let shown = if ids.is_empty() {
        "*(none)*".to_owned()
    } else {
        ids.iter().map(|r| format!("<@&{r}>")).join(", ")
    };
    data.settings.update(|s| s.allowed_role_ids = ids)?;
    Ok(format!("✅ Allowed roles updated to: {shown}"))
}

/// Channel changes from `/config channels`. `None` leaves a value untouched.
#[derive(Debug, Default)]
struct ChannelChanges {
    five_stack: Option<String>,
    trio: Option<String>,
    waiting: Option<ChannelId>,
    lobby: Option<ChannelId>,
    queue_text: Option<ChannelId>,
    history: Option<ChannelId>,
    leaderboard: Option<ChannelId>,
}

async fn handle_channels(data: &Data, changes: ChannelChanges) -> Result<String> {
    let five_stack: Option<Vec<ChannelId>> =
        changes.five_stack.as_deref().map(parse_id_list).transpose()?;
    let trio: Option<Vec<ChannelId>> = changes.trio.as_deref().map(parse_id_list).transpose()?;

    let updated = data.settings.try_update(|s| {
        if let Some(ids) = five_stack {
            s.five_stack_channel_ids = ids;
        }
        if let Some(ids) = trio {
            s.trio_channel_ids = ids;
        }
        ensure!(
            !s.five_stack_channel_ids.is_empty() || !s.trio_channel_ids.is_empty(),
            "Please provide at least one channel ID."
        );
        if let Some(id) = changes.waiting {
            s.waiting_channel_id = Some(id);
        }
        if let Some(id) = changes.lobby {
            s.lobby_channel_id = Some(id);
        }
        if let Some(id) = changes.queue_text {
            if s.queue_message_channel_id != Some(id) {
                s.queue_message_id = None;
            }
            s.queue_message_channel_id = Some(id);
        }
        if let Some(id) = changes.history {
            s.match_history_channel_id = Some(id);
        }
        if let Some(id) = changes.leaderboard {
            if s.leaderboard_channel_id != Some(id) {
                s.leaderboard_message_id = None;
            }
            s.leaderboard_channel_id = Some(id);
        }
        Ok::<_, anyhow::Error>(s.clone())
    })?;
    data.boards.refresh_queue(data.watcher.countdown_footer()).await?;
    info!(
        five_stack = updated.five_stack_channel_ids.len(),
        trio = updated.trio_channel_ids.len(),
        "channel configuration updated"
    );
    Ok(format!(
        "✅ Channels updated.\n**5Q:** {}\n**Trio:** {}",
        channel_list(&updated.five_stack_channel_ids),
        channel_list(&updated.trio_channel_ids)
    ))
}

async fn handle_timers(
    data: &Data,
    countdown: Option<u64>,
    tick: Option<u64>,
    delete_delay: Option<u64>,
) -> Result<String> {
    ensure!(countdown != Some(0), "The trio countdown must be at least 1 second.");
    ensure!(tick != Some(0), "The countdown tick must be at least 1 second.");
    let s = data.settings.update(|s| {
        if let Some(secs) = countdown {
            s.trio_countdown_secs = secs;
        }
        if let Some(secs) = tick {
            s.countdown_tick_secs = secs;
        }
        if let Some(minutes) = delete_delay {
            s.match_delete_delay_minutes = minutes;
        }
        s.clone()
    })?;
    Ok(format!(
        "✅ Timers updated: trio countdown {}s, tick {}s, card deletion after {} min.",
        s.trio_countdown_secs, s.countdown_tick_secs, s.match_delete_delay_minutes
    ))
}

async fn handle_reset(data: &Data) -> Result<String> {
    data.store.clear_queue().await?;
    let dropped = data.settings.update(|s| {
        let n = s.active_matches.len();
        s.active_matches.clear();
        n
    })?;
    data.boards.refresh_queue(data.watcher.countdown_footer()).await?;
    info!(dropped, "queue and active matches reset");
    Ok(format!("♻️ Queue cleared and {dropped} active match(es) dropped."))
}

/// Configure the queue system (admins only)
#[poise::command(
    slash_command,
    subcommands("show", "queue_size", "roles", "channels", "timers", "reset"),
    subcommand_required,
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn config(_: Context<'_>) -> Result<()> {
    Ok(())
}

/// Show the current configuration
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn show(ctx: Context<'_>) -> Result<()> {
    send_card(ctx, settings_card(&ctx.data().settings.snapshot()), true).await
}

/// Set how many members the queue summary counts toward
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn queue_size(
    ctx: Context<'_>,
    #[description = "Queue size (at least 2)"] size: usize,
) -> Result<()> {
    let resp = handle_queue_size(ctx.data(), size)
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}

/// Set the allowed roles
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn roles(
    ctx: Context<'_>,
    #[description = "Comma separated role ids or mentions"] roles: String,
) -> Result<()> {
    let resp = handle_roles(ctx.data(), roles)
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}

/// Set the match channel pools and the queue channels
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn channels(
    ctx: Context<'_>,
    #[description = "Comma separated 5Q voice channel ids"] five_stack: Option<String>,
    #[description = "Comma separated Trio voice channel ids"] trio: Option<String>,
    #[description = "Voice channel members join to queue"] waiting: Option<GuildChannel>,
    #[description = "Voice channel players return to after a match"] lobby: Option<GuildChannel>,
    #[description = "Text channel for the queue summary"] queue_text: Option<GuildChannel>,
    #[description = "Text channel for match logs"] history: Option<GuildChannel>,
    #[description = "Text channel for the leaderboard"] leaderboard: Option<GuildChannel>,
) -> Result<()> {
    let changes = ChannelChanges {
        five_stack,
        trio,
        waiting: waiting.map(|c| c.id),
        lobby: lobby.map(|c| c.id),
        queue_text: queue_text.map(|c| c.id),
        history: history.map(|c| c.id),
        leaderboard: leaderboard.map(|c| c.id),
    };
    let resp = handle_channels(ctx.data(), changes)
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}

/// Set the trio countdown and match card timers
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn timers(
    ctx: Context<'_>,
    #[description = "Seconds before a trio starts"] trio_countdown: Option<u64>,
    #[description = "Seconds between countdown updates"] tick: Option<u64>,
    #[description = "Minutes before a finished match card is deleted (0 keeps it)"]
    delete_delay: Option<u64>,
) -> Result<()> {
    let resp = handle_timers(ctx.data(), trio_countdown, tick, delete_delay)
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}

/// Clear the queue and drop all active matches
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn reset(ctx: Context<'_>) -> Result<()> {
    let resp = handle_reset(ctx.data())
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}
