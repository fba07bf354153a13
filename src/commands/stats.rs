use anyhow::Result;
use poise::serenity_prelude::{User, UserId};

use crate::discord_helpers::send_card;
use crate::helpers::display_name;
use crate::platform::{Card, COLOUR_BLUE, COLOUR_GREY};
use crate::stats::{player_stats, KindStats};
use crate::store::MatchFilter;
use crate::types::{Context, Data};

fn games_line(label: &str, stats: &KindStats) -> String {
    format!(
        "**{label}:** {} games | {:.1}% winrate",
        stats.games,
        stats.win_rate()
    )
}

async fn handle_stats(data: &Data, user: UserId, name: &str) -> Result<Card> {
    let records = data
        .store
        .query_match_records(MatchFilter {
            player: Some(user),
            ..Default::default()
        })
        .await?;
    let stats = player_stats(&records, user);
    if stats.overall.games == 0 {
        return Ok(Card::new(
            "Match Stats",
            format!("❌ No matches found for **{name}**."),
            COLOUR_GREY,
        ));
    }
    Ok(Card::new(
        format!("{name}'s Match Stats"),
        [
            games_line("🌐 Global", &stats.overall),
            games_line("💥 5Q", &stats.five_stack),
            games_line("🎯 Trio", &stats.trio),
        ]
        .join("\n"),
        COLOUR_BLUE,
    )
    .timestamped())
}

/// View match statistics for yourself or another member
#[poise::command(slash_command)]
pub async fn stats(
    ctx: Context<'_>,
    #[description = "User to check"] user: Option<User>,
) -> Result<()> {
    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    match handle_stats(ctx.data(), target.id, &display_name(target)).await {
        Ok(card) => send_card(ctx, card, false).await,
        Err(e) => {
            ctx.say(format!("Error: {}", e)).await?;
            Ok(())
        }
    }
}
