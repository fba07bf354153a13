//! Domain types shared by the queue, the match lifecycle and the stores.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, MessageId, UserId};
use thiserror::Error;

use crate::helpers::now_millis;

/// The two supported match formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    #[serde(rename = "5q")]
    FiveStack,
    #[serde(rename = "trio")]
    Trio,
}

impl MatchKind {
    /// Number of players drawn from the queue for this kind.
    pub fn size(self) -> usize {
        match self {
            MatchKind::FiveStack => 5,
            MatchKind::Trio => 3,
        }
    }

    /// Tag used in ids and in the `matches` table.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::FiveStack => "5q",
            MatchKind::Trio => "trio",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatchKind::FiveStack => "5Q",
            MatchKind::Trio => "TRIO",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5q" => Ok(MatchKind::FiveStack),
            "trio" => Ok(MatchKind::Trio),
            other => Err(ParseIdError::UnknownKind(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Loss,
}

impl MatchResult {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchResult::Win => "win",
            MatchResult::Loss => "loss",
        }
    }
}

impl FromStr for MatchResult {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(MatchResult::Win),
            "loss" => Ok(MatchResult::Loss),
            other => Err(ParseIdError::UnknownResult(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    #[error("unknown match kind `{0}`")]
    UnknownKind(String),
    #[error("unknown match result `{0}`")]
    UnknownResult(String),
    #[error("malformed match id `{0}`")]
    Malformed(String),
}

static MATCH_SEQ: AtomicU32 = AtomicU32::new(0);

/// Identifier of an in-flight match: kind tag, creation time and a
/// process-wide sequence number, rendered as `<kind>_<millis>_<seq>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MatchId {
    pub kind: MatchKind,
    pub started_at: i64,
    pub seq: u32,
}

impl MatchId {
    /// Allocates a fresh id. Two ids created in the same millisecond differ by `seq`.
    pub fn next(kind: MatchKind) -> Self {
        Self {
            kind,
            started_at: now_millis(),
            seq: MATCH_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.kind, self.started_at, self.seq)
    }
}

impl FromStr for MatchId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseIdError::Malformed(s.to_owned());
        let mut parts = s.splitn(3, '_');
        let kind = parts.next().ok_or_else(malformed)?.parse()?;
        let started_at = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let seq = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        Ok(Self {
            kind,
            started_at,
            seq,
        })
    }
}

impl From<MatchId> for String {
    fn from(id: MatchId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MatchId {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Where a match is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Players have been moved; nobody has pressed "Finish" yet.
    InProgress,
    /// Finished, waiting for a win/loss selection.
    AwaitingResult,
    /// A result submission has claimed the match and is being applied.
    Recording,
}

/// A message posted by the bot, addressed by channel and message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn link(&self, guild_id: impl fmt::Display) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            guild_id, self.channel_id, self.message_id
        )
    }
}

/// An in-flight match as held in the settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMatch {
    pub id: MatchId,
    pub kind: MatchKind,
    pub players: Vec<UserId>,
    pub target_channel_id: ChannelId,
    pub card: Option<MessageRef>,
    pub started_at: i64,
    pub phase: MatchPhase,
}

impl ActiveMatch {
    pub fn pending_result(&self) -> bool {
        self.phase == MatchPhase::AwaitingResult
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub user_id: UserId,
    pub joined_at: i64,
}

/// A finished match as stored in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub id: i32,
    pub kind: MatchKind,
    pub player_ids: Vec<UserId>,
    pub result: MatchResult,
    pub started_at: i64,
    pub finished_at: i64,
    pub log: Option<MessageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatchRecord {
    pub kind: MatchKind,
    pub player_ids: Vec<UserId>,
    pub result: MatchResult,
    pub started_at: i64,
    pub finished_at: i64,
    pub log: Option<MessageRef>,
}

/// A member's registered in-game profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub user_id: UserId,
    pub game_id: String,
    pub nickname: String,
}
