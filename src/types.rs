use std::sync::Arc;

use serenity::all::GuildId;

use crate::boards::Boards;
use crate::lifecycle::MatchManager;
use crate::platform::Platform;
use crate::settings::SettingsStore;
use crate::store::Store;
use crate::watcher::QueueWatcher;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub guild_id: GuildId,
    pub settings: Arc<SettingsStore>,
    pub store: Arc<dyn Store>,
    pub platform: Arc<dyn Platform>,
    pub boards: Arc<Boards>,
    pub matches: Arc<MatchManager>,
    pub watcher: Arc<QueueWatcher>,
}

pub type Context<'a> = poise::Context<'a, Data, anyhow::Error>;
