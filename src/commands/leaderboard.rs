use anyhow::Result;

use crate::discord_helpers::send_card;
use crate::platform::Card;
use crate::stats::{leaderboard as rank, leaderboard_card, LeaderboardFilter, LeaderboardSort};
use crate::store::MatchFilter;
use crate::types::{Context, Data};

async fn handle_show(
    data: &Data,
    filter: LeaderboardFilter,
    sort: LeaderboardSort,
) -> Result<Card> {
    let records = data
        .store
        .query_match_records(MatchFilter::default())
        .await?;
    Ok(leaderboard_card(&rank(&records, filter, sort), filter))
}

async fn handle_update(
    data: &Data,
    filter: Option<LeaderboardFilter>,
    sort: Option<LeaderboardSort>,
) -> Result<String> {
    if filter.is_some() || sort.is_some() {
        data.settings.update(|s| {
            if let Some(filter) = filter {
                s.leaderboard_filter = filter;
            }
            if let Some(sort) = sort {
                s.leaderboard_sort = sort;
            }
        })?;
    }
    data.boards.refresh_leaderboard().await?;
    Ok("✅ Leaderboard refreshed.".to_owned())
}

/// View or refresh the leaderboard
#[poise::command(slash_command, subcommands("show", "update"), subcommand_required)]
pub async fn leaderboard(_: Context<'_>) -> Result<()> {
    Ok(())
}

/// Show the leaderboard in chat
#[poise::command(slash_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Queue type to show"]
    #[rename = "type"]
    kind: Option<LeaderboardFilter>,
    #[description = "Sort by matches or winrate"] sort: Option<LeaderboardSort>,
) -> Result<()> {
    let filter = kind.unwrap_or(LeaderboardFilter::All);
    let sort = sort.unwrap_or(LeaderboardSort::Matches);
    match handle_show(ctx.data(), filter, sort).await {
        Ok(card) => send_card(ctx, card, false).await,
        Err(e) => {
            ctx.say(format!("Error: {}", e)).await?;
            Ok(())
        }
    }
}

/// Force refresh the persistent leaderboard message
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn update(
    ctx: Context<'_>,
    #[description = "Queue type the persistent leaderboard shows"]
    #[rename = "type"]
    kind: Option<LeaderboardFilter>,
    #[description = "Sort the persistent leaderboard by matches or winrate"]
    sort: Option<LeaderboardSort>,
) -> Result<()> {
    let resp = handle_update(ctx.data(), kind, sort)
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}
