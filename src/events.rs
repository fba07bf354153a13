//! Gateway events: voice presence for the queue and the match card buttons.

use anyhow::{Error, Result};
use poise::serenity_prelude as serenity;
use serenity::{
    ComponentInteraction, CreateInteractionResponse, CreateInteractionResponseMessage,
    EditInteractionResponse, FullEvent, Interaction, VoiceState,
};
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::model::{MatchId, MatchResult};
use crate::types::Data;
use crate::watcher::PresenceChange;

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<()> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!(user = %data_about_bot.user.name, "logged in");
        }
        FullEvent::VoiceStateUpdate { old, new } => {
            if new.guild_id != Some(data.guild_id) {
                return Ok(());
            }
            let change = PresenceChange {
                user: new.user_id,
                is_bot: is_bot(ctx, new),
                previous: old.as_ref().and_then(|o| o.channel_id),
                current: new.channel_id,
            };
            data.watcher.handle_presence_change(change).await;
        }
        FullEvent::InteractionCreate {
            interaction: Interaction::Component(component),
        } => {
            if let Some(action) = ButtonAction::parse(&component.data.custom_id) {
                handle_button(ctx, component, action, data).await?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn is_bot(ctx: &serenity::Context, state: &VoiceState) -> bool {
    state
        .member
        .as_ref()
        .map(|m| m.user.bot)
        .or_else(|| ctx.cache.user(state.user_id).map(|u| u.bot))
        .unwrap_or(false)
}

/// A match card button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Finish(MatchId),
    Submit(MatchId, MatchResult),
}

impl ButtonAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        if let Some(id) = custom_id.strip_prefix("finish_match_") {
            return id.parse().ok().map(ButtonAction::Finish);
        }
        let (result, id) = custom_id.strip_prefix("result_")?.split_once('_')?;
        Some(ButtonAction::Submit(id.parse().ok()?, result.parse().ok()?))
    }
}

async fn handle_button(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    action: ButtonAction,
    data: &Data,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(
                CreateInteractionResponseMessage::new().ephemeral(true),
            ),
        )
        .await?;

    let outcome = match action {
        ButtonAction::Finish(id) => data
            .matches
            .mark_finished(id)
            .await
            .map(|()| "🏁 Match marked finished. Waiting for result selection.".to_owned()),
        ButtonAction::Submit(id, result) => {
            data.matches.submit_result(id, result).await.map(|report| {
                let failed = report.moves.failed();
                if failed.is_empty() {
                    format!(
                        "✅ Match result recorded as {}.",
                        result.as_str().to_uppercase()
                    )
                } else {
                    format!(
                        "✅ Match result recorded as {}. Could not move {} back to the lobby.",
                        result.as_str().to_uppercase(),
                        crate::helpers::format_ids(&failed)
                    )
                }
            })
        }
    };
    let reply = outcome.unwrap_or_else(|e| describe(component, &e));

    component
        .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
        .await?;
    Ok(())
}

fn describe(component: &ComponentInteraction, err: &QueueError) -> String {
    if err.is_informational() {
        warn!(user = %component.user.id, custom_id = %component.data.custom_id, "{}", err);
        format!("⚠️ {err}")
    } else {
        error!(user = %component.user.id, custom_id = %component.data.custom_id, "button failed: {}", err);
        format!("❌ {err}")
    }
}
