use anyhow::{ensure, Result};
use poise::serenity_prelude::{User, UserId};
use tracing::info;

use crate::discord_helpers::send_card;
use crate::helpers::display_name;
use crate::model::Player;
use crate::platform::{Card, COLOUR_BLUE, COLOUR_GREY};
use crate::types::{Context, Data};

async fn handle_register(
    data: &Data,
    user: UserId,
    game_id: String,
    nickname: String,
) -> Result<String> {
    let game_id = game_id.trim().to_owned();
    let nickname = nickname.trim().to_owned();
    ensure!(!game_id.is_empty(), "Player ID can't be empty.");
    ensure!(!nickname.is_empty(), "Nickname can't be empty.");

    data.store
        .upsert_player(Player {
            user_id: user,
            game_id: game_id.clone(),
            nickname: nickname.clone(),
        })
        .await?;
    info!(user = %user, "registered game profile");
    Ok(format!(
        "✅ Your MLBB profile has been saved!\n**Nickname:** {nickname}\n**Player ID:** {game_id}"
    ))
}

async fn handle_profile(data: &Data, user: UserId, name: &str) -> Result<Card> {
    Ok(match data.store.get_player(user).await? {
        Some(player) => Card::new(
            format!("{name}'s MLBB Profile"),
            format!(
                "🆔 **Player ID:** {}\n🏷️ **Nickname:** {}",
                player.game_id, player.nickname
            ),
            COLOUR_BLUE,
        )
        .timestamped(),
        None => Card::new(
            "Profile",
            format!("❌ No MLBB profile found for **{name}**."),
            COLOUR_GREY,
        ),
    })
}

/// Register or update your Mobile Legends player ID
#[poise::command(slash_command, ephemeral)]
pub async fn registermlbb(
    ctx: Context<'_>,
    #[description = "Your MLBB Player ID"] id: String,
    #[description = "Your in-game nickname"] nickname: String,
) -> Result<()> {
    let resp = handle_register(ctx.data(), ctx.author().id, id, nickname)
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}

/// View your or another member's MLBB profile
#[poise::command(slash_command)]
pub async fn profile(
    ctx: Context<'_>,
    #[description = "The user to view"] user: Option<User>,
) -> Result<()> {
    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    match handle_profile(ctx.data(), target.id, &display_name(target)).await {
        Ok(card) => send_card(ctx, card, false).await,
        Err(e) => {
            ctx.say(format!("Error: {}", e)).await?;
            Ok(())
        }
    }
}
