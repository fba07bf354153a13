//! Test doubles for the chat platform and a fully wired queue.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serenity::all::{ChannelId, MessageId, UserId};
use serenity::async_trait;

use crate::boards::Boards;
use crate::lifecycle::MatchManager;
use crate::model::MessageRef;
use crate::platform::{Card, Platform, PlatformError};
use crate::settings::{Settings, SettingsStore};
use crate::store::MemoryStore;
use crate::watcher::{PresenceChange, QueueWatcher};

pub const WAITING: ChannelId = ChannelId::new(1);
pub const LOBBY: ChannelId = ChannelId::new(2);
pub const QUEUE_TEXT: ChannelId = ChannelId::new(10);
pub const FIVE_A: ChannelId = ChannelId::new(20);
pub const FIVE_B: ChannelId = ChannelId::new(21);
pub const TRIO: ChannelId = ChannelId::new(30);
pub const HISTORY: ChannelId = ChannelId::new(40);
pub const LEADERBOARD: ChannelId = ChannelId::new(50);

pub fn user(id: u64) -> UserId {
    UserId::new(id)
}

#[derive(Default)]
pub struct FakeState {
    pub voice: HashMap<UserId, ChannelId>,
    pub bots: HashSet<UserId>,
    pub gone: HashSet<UserId>,
    pub failing_moves: HashSet<UserId>,
    pub failing_dms: HashSet<UserId>,
    pub failing_lookups: bool,
    pub moves: Vec<(UserId, ChannelId)>,
    pub dms: Vec<(UserId, String)>,
    pub posted: Vec<(MessageRef, Card)>,
    pub edits: Vec<(MessageRef, Card)>,
    pub deleted: Vec<MessageRef>,
    pub live: HashSet<MessageRef>,
    /// Runs after each posted message, with the channel it was posted in.
    pub on_post: Option<Box<dyn Fn(ChannelId) + Send>>,
    next_message: u64,
}

/// Records every request and answers presence queries from `voice`.
#[derive(Default)]
pub struct FakePlatform {
    pub state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn posted_in(&self, channel: ChannelId) -> Vec<(MessageRef, Card)> {
        self.with(|s| {
            s.posted
                .iter()
                .filter(|(m, _)| m.channel_id == channel)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn voice_members(&self, channel: ChannelId) -> Vec<UserId> {
        self.with(|s| {
            let mut members: Vec<_> = s
                .voice
                .iter()
                .filter(|(u, c)| **c == channel && !s.bots.contains(u))
                .map(|(u, _)| *u)
                .collect();
            members.sort();
            members
        })
    }

    async fn member_voice_channel(&self, user: UserId) -> Option<ChannelId> {
        self.with(|s| s.voice.get(&user).copied())
    }

    async fn move_member(&self, user: UserId, channel: ChannelId) -> Result<(), PlatformError> {
        self.with(|s| {
            if s.gone.contains(&user) {
                return Err(PlatformError::MemberGone(user));
            }
            if s.failing_moves.contains(&user) {
                return Err(PlatformError::Rejected("missing permissions".into()));
            }
            s.moves.push((user, channel));
            s.voice.insert(user, channel);
            Ok(())
        })
    }

    async fn send_direct_message(&self, user: UserId, text: &str) -> Result<(), PlatformError> {
        self.with(|s| {
            if s.failing_dms.contains(&user) {
                return Err(PlatformError::Rejected("dms closed".into()));
            }
            s.dms.push((user, text.to_owned()));
            Ok(())
        })
    }

    async fn post_message(
        &self,
        channel: ChannelId,
        card: Card,
    ) -> Result<MessageRef, PlatformError> {
        self.with(|s| {
            s.next_message += 1;
            let message = MessageRef {
                channel_id: channel,
                message_id: MessageId::new(1000 + s.next_message),
            };
            s.live.insert(message);
            s.posted.push((message, card));
            if let Some(hook) = &s.on_post {
                hook(channel);
            }
            Ok(message)
        })
    }

    async fn edit_message(&self, message: MessageRef, card: Card) -> Result<(), PlatformError> {
        self.with(|s| {
            if !s.live.contains(&message) {
                return Err(PlatformError::Rejected("unknown message".into()));
            }
            s.edits.push((message, card));
            Ok(())
        })
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), PlatformError> {
        self.with(|s| {
            s.live.remove(&message);
            s.deleted.push(message);
            Ok(())
        })
    }

    async fn message_exists(&self, message: MessageRef) -> Result<bool, PlatformError> {
        self.with(|s| {
            if s.failing_lookups {
                return Err(PlatformError::Rejected("rate limited".into()));
            }
            Ok(s.live.contains(&message))
        })
    }
}

pub fn test_settings() -> Settings {
    Settings {
        waiting_channel_id: Some(WAITING),
        lobby_channel_id: Some(LOBBY),
        queue_message_channel_id: Some(QUEUE_TEXT),
        five_stack_channel_ids: vec![FIVE_A, FIVE_B],
        trio_channel_ids: vec![TRIO],
        match_history_channel_id: Some(HISTORY),
        leaderboard_channel_id: Some(LEADERBOARD),
        ..Settings::default()
    }
}

/// All queue components wired to fakes.
pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub store: Arc<MemoryStore>,
    pub settings: Arc<SettingsStore>,
    pub boards: Arc<Boards>,
    pub manager: Arc<MatchManager>,
    pub watcher: Arc<QueueWatcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::with_settings_store(Arc::new(SettingsStore::in_memory(settings)))
    }

    pub fn with_settings_store(settings: Arc<SettingsStore>) -> Self {
        let platform = Arc::new(FakePlatform::default());
        let store = Arc::new(MemoryStore::default());
        let boards = Arc::new(Boards::new(
            settings.clone(),
            store.clone(),
            platform.clone(),
        ));
        let manager = Arc::new(MatchManager::with_seed(
            settings.clone(),
            store.clone(),
            platform.clone(),
            boards.clone(),
            7,
        ));
        let watcher = Arc::new(QueueWatcher::new(
            settings.clone(),
            store.clone(),
            platform.clone(),
            boards.clone(),
            manager.clone(),
        ));
        Self {
            platform,
            store,
            settings,
            boards,
            manager,
            watcher,
        }
    }

    /// Moves `id` into `channel` and delivers the presence event.
    pub async fn enter(&self, id: u64, channel: Option<ChannelId>) {
        let u = user(id);
        let previous = self.platform.with(|s| match channel {
            Some(c) => s.voice.insert(u, c),
            None => s.voice.remove(&u),
        });
        self.watcher
            .handle_presence_change(PresenceChange {
                user: u,
                is_bot: self.platform.with(|s| s.bots.contains(&u)),
                previous,
                current: channel,
            })
            .await;
    }

    pub async fn join(&self, id: u64) {
        self.enter(id, Some(WAITING)).await;
    }

    pub async fn leave(&self, id: u64) {
        self.enter(id, None).await;
    }
}

impl Harness {
    /// Command-level state over the same fakes.
    pub fn data(&self) -> crate::types::Data {
        crate::types::Data {
            guild_id: serenity::all::GuildId::new(99),
            settings: self.settings.clone(),
            store: self.store.clone(),
            platform: self.platform.clone(),
            boards: self.boards.clone(),
            matches: self.manager.clone(),
            watcher: self.watcher.clone(),
        }
    }
}
