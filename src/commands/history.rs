use anyhow::{Context as _, Result};
use poise::serenity_prelude::{User, UserId};

use crate::discord_helpers::send_card;
use crate::helpers::display_name;
use crate::history::{history_card, recent_matches};
use crate::platform::Card;
use crate::types::{Context, Data};

async fn handle_history(data: &Data, user: UserId, name: &str) -> Result<Card> {
    data.settings
        .snapshot()
        .match_history_channel_id
        .context("⚠️ Couldn't find the match-history channel in this server.")?;
    let records = recent_matches(data.store.as_ref(), data.platform.as_ref(), user).await?;
    Ok(history_card(name, &records, data.guild_id))
}

/// Shows a player's recent match history
#[poise::command(slash_command)]
pub async fn history(
    ctx: Context<'_>,
    #[description = "Select whose history to view (defaults to yourself)."] user: Option<User>,
) -> Result<()> {
    ctx.defer().await?;
    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    match handle_history(ctx.data(), target.id, &display_name(target)).await {
        Ok(card) => send_card(ctx, card, false).await,
        Err(e) => {
            ctx.say(format!("Error: {}", e)).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{user, Harness};

    #[tokio::test]
    async fn requires_history_channel() {
        let h = Harness::new();
        h.settings
            .update(|s| s.match_history_channel_id = None)
            .unwrap();
        let err = handle_history(&h.data(), user(1), "one").await.unwrap_err();
        assert!(err.to_string().contains("match-history"));
    }

    #[tokio::test]
    async fn empty_history() {
        let h = Harness::new();
        let card = handle_history(&h.data(), user(1), "one").await.unwrap();
        assert_eq!(card.title, "one's Recent Matches");
    }
}
