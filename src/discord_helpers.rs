use std::sync::Arc;

use serenity::all::{
    ButtonStyle, Cache, ChannelId, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter,
    CreateMessage, EditMessage, GuildId, Http, HttpError, Timestamp, UserId,
};
use serenity::async_trait;
use tracing::debug;

use crate::model::MessageRef;
use crate::platform::{ButtonKind, Card, Platform, PlatformError};
use crate::types::Context;

/// Discord JSON error code for "Unknown Member".
const UNKNOWN_MEMBER: isize = 10007;
/// Discord JSON error code for "Unknown Channel".
const UNKNOWN_CHANNEL: isize = 10003;
/// Discord JSON error code for "Unknown Message".
const UNKNOWN_MESSAGE: isize = 10008;

/// The queue's view of one guild, backed by the gateway cache and the HTTP client.
pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    guild_id: GuildId,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, guild_id: GuildId) -> Self {
        Self {
            http,
            cache,
            guild_id,
        }
    }

    fn http(&self) -> &Http {
        &self.http
    }
}

fn discord_code(err: &serenity::Error) -> Option<isize> {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            Some(response.error.code)
        }
        _ => None,
    }
}

/// Maps a failed request against an existing message onto `PlatformError`.
fn message_error(err: serenity::Error, message: MessageRef) -> PlatformError {
    match discord_code(&err) {
        Some(UNKNOWN_MESSAGE) => PlatformError::UnknownMessage(message.message_id),
        Some(UNKNOWN_CHANNEL) => PlatformError::UnknownChannel(message.channel_id),
        _ => err.into(),
    }
}

pub fn embed(card: &Card) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(&card.title)
        .description(&card.description)
        .colour(card.colour);
    if let Some(footer) = &card.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    if card.timestamp {
        embed = embed.timestamp(Timestamp::now());
    }
    embed
}

fn components(card: &Card) -> Vec<CreateActionRow> {
    if card.buttons.is_empty() {
        return Vec::new();
    }
    let buttons = card
        .buttons
        .iter()
        .map(|b| {
            let style = match b.kind {
                ButtonKind::Success => ButtonStyle::Success,
                ButtonKind::Danger => ButtonStyle::Danger,
            };
            CreateButton::new(&b.custom_id).label(&b.label).style(style)
        })
        .collect();
    vec![CreateActionRow::Buttons(buttons)]
}

/// Replies to a command with `card` rendered as an embed.
pub async fn send_card(ctx: Context<'_>, card: Card, ephemeral: bool) -> anyhow::Result<()> {
    ctx.send(
        poise::CreateReply::default()
            .embed(embed(&card))
            .ephemeral(ephemeral),
    )
    .await?;
    Ok(())
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn voice_members(&self, channel: ChannelId) -> Vec<UserId> {
        let Some(guild) = self.cache.guild(self.guild_id) else {
            return Vec::new();
        };
        let mut members: Vec<_> = guild
            .voice_states
            .values()
            .filter(|v| v.channel_id == Some(channel))
            .filter(|v| {
                let is_bot = v
                    .member
                    .as_ref()
                    .map(|m| m.user.bot)
                    .or_else(|| guild.members.get(&v.user_id).map(|m| m.user.bot))
                    .unwrap_or(false);
                !is_bot
            })
            .map(|v| v.user_id)
            .collect();
        members.sort();
        members
    }

    async fn member_voice_channel(&self, user: UserId) -> Option<ChannelId> {
        let guild = self.cache.guild(self.guild_id)?;
        guild.voice_states.get(&user).and_then(|v| v.channel_id)
    }

    async fn move_member(&self, user: UserId, channel: ChannelId) -> Result<(), PlatformError> {
        match self.guild_id.move_member(self.http(), user, channel).await {
            Ok(_) => Ok(()),
            Err(e) if discord_code(&e) == Some(UNKNOWN_MEMBER) => {
                Err(PlatformError::MemberGone(user))
            }
            Err(e) if discord_code(&e) == Some(UNKNOWN_CHANNEL) => {
                Err(PlatformError::UnknownChannel(channel))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send_direct_message(&self, user: UserId, text: &str) -> Result<(), PlatformError> {
        user.create_dm_channel(self.http())
            .await?
            .send_message(self.http(), CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn post_message(
        &self,
        channel: ChannelId,
        card: Card,
    ) -> Result<MessageRef, PlatformError> {
        let builder = CreateMessage::new()
            .embed(embed(&card))
            .components(components(&card));
        let message = match channel.send_message(self.http(), builder).await {
            Ok(message) => message,
            Err(e) if discord_code(&e) == Some(UNKNOWN_CHANNEL) => {
                return Err(PlatformError::UnknownChannel(channel))
            }
            Err(e) => return Err(e.into()),
        };
        debug!(channel = %channel, message = %message.id, "posted message");
        Ok(MessageRef {
            channel_id: channel,
            message_id: message.id,
        })
    }

    async fn edit_message(&self, message: MessageRef, card: Card) -> Result<(), PlatformError> {
        let builder = EditMessage::new()
            .embed(embed(&card))
            .components(components(&card));
        message
            .channel_id
            .edit_message(self.http(), message.message_id, builder)
            .await
            .map_err(|e| message_error(e, message))?;
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), PlatformError> {
        message
            .channel_id
            .delete_message(self.http(), message.message_id)
            .await
            .map_err(|e| message_error(e, message))?;
        Ok(())
    }

    async fn message_exists(&self, message: MessageRef) -> Result<bool, PlatformError> {
        match message
            .channel_id
            .message(self.http(), message.message_id)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match message_error(e, message) {
                PlatformError::UnknownMessage(_) | PlatformError::UnknownChannel(_) => Ok(false),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_buttons_become_one_row() {
        let card = Card::new("t", "d", 0).button(
            "finish_match_5q_1_0".into(),
            "🏁 Finish Match",
            ButtonKind::Success,
        );
        assert_eq!(components(&card).len(), 1);
        assert!(components(&Card::new("t", "d", 0)).is_empty());
    }
}
