//! The chat platform as seen by the queue: voice presence, member moves,
//! direct messages and the bot's own messages.

use serenity::all::{ChannelId, MessageId, UserId};
use serenity::async_trait;
use thiserror::Error;

use crate::model::MessageRef;

pub const COLOUR_BLUE: u32 = 0x3498DB;
pub const COLOUR_PURPLE: u32 = 0x9B59B6;
pub const COLOUR_GREEN: u32 = 0x57F287;
pub const COLOUR_RED: u32 = 0xED4245;
pub const COLOUR_GREY: u32 = 0x95A5A6;
pub const COLOUR_GOLD: u32 = 0xF1C40F;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("member {0} is not in the guild")]
    MemberGone(UserId),

    #[error("channel {0} not found")]
    UnknownChannel(ChannelId),

    #[error("message {0} not found")]
    UnknownMessage(MessageId),

    #[error("request rejected: {0}")]
    Rejected(String),

    /// Boxed because `serenity::Error` is large.
    #[error(transparent)]
    Discord(#[from] Box<serenity::Error>),
}

impl From<serenity::Error> for PlatformError {
    fn from(err: serenity::Error) -> Self {
        PlatformError::Discord(Box::new(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardButton {
    pub custom_id: String,
    pub label: String,
    pub kind: ButtonKind,
}

/// Content of an embed posted by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Card {
    pub title: String,
    pub description: String,
    pub colour: u32,
    pub footer: Option<String>,
    pub buttons: Vec<CardButton>,
    pub timestamp: bool,
}

impl Card {
    pub fn new(title: impl Into<String>, description: impl Into<String>, colour: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            colour,
            ..Default::default()
        }
    }

    pub fn footer(mut self, footer: Option<String>) -> Self {
        self.footer = footer;
        self
    }

    pub fn button(mut self, custom_id: String, label: &str, kind: ButtonKind) -> Self {
        self.buttons.push(CardButton {
            custom_id,
            label: label.to_owned(),
            kind,
        });
        self
    }

    pub fn timestamped(mut self) -> Self {
        self.timestamp = true;
        self
    }
}

/// Operations the bot performs against the chat platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Non-bot members currently connected to `channel`.
    async fn voice_members(&self, channel: ChannelId) -> Vec<UserId>;

    /// The voice channel `user` is connected to, if any.
    async fn member_voice_channel(&self, user: UserId) -> Option<ChannelId>;

    async fn move_member(&self, user: UserId, channel: ChannelId) -> Result<(), PlatformError>;

    async fn send_direct_message(&self, user: UserId, text: &str) -> Result<(), PlatformError>;

    async fn post_message(&self, channel: ChannelId, card: Card)
        -> Result<MessageRef, PlatformError>;

    async fn edit_message(&self, message: MessageRef, card: Card) -> Result<(), PlatformError>;

    async fn delete_message(&self, message: MessageRef) -> Result<(), PlatformError>;

    /// Whether `message` still resolves. `Ok(false)` only when the platform
    /// reports the message or its channel as unknown.
    async fn message_exists(&self, message: MessageRef) -> Result<bool, PlatformError>;
}

/// What happened to one member during a batch operation.
#[derive(Debug)]
pub enum MemberOutcome {
    Done,
    Skipped(&'static str),
    Failed(PlatformError),
}

/// Per-member outcomes of a best-effort batch (DMs, voice moves).
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(UserId, MemberOutcome)>,
}

impl BatchReport {
    pub fn push(&mut self, user: UserId, outcome: MemberOutcome) {
        self.outcomes.push((user, outcome));
    }

    pub fn done(&self) -> usize {
        self.count(|o| matches!(o, MemberOutcome::Done))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MemberOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> Vec<UserId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, MemberOutcome::Failed(_)))
            .map(|(u, _)| *u)
            .collect()
    }

    fn count(&self, pred: impl Fn(&MemberOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}
