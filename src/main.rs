mod boards;
mod commands;
mod config;
mod discord_helpers;
mod error;
mod events;
mod helpers;
mod history;
mod lifecycle;
mod model;
mod platform;
mod settings;
mod stats;
mod store;
#[cfg(test)]
mod testing;
mod types;
mod watcher;

use crate::boards::Boards;
use crate::config::BotConfig;
use crate::discord_helpers::DiscordPlatform;
use crate::events::event_handler;
use crate::helpers::handle_error;
use crate::lifecycle::MatchManager;
use crate::platform::Platform;
use crate::settings::SettingsStore;
use crate::store::{DbStore, Store};
use crate::types::Data;
use crate::watcher::QueueWatcher;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{info, warn};

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,serenity=warn".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let config = BotConfig::from_env()?;

    let settings = Arc::new(SettingsStore::load(&config.settings_path)?);
    let store: Arc<dyn Store> = Arc::new(DbStore::connect(&config.database_url).await?);
    let purged = store.purge_unlogged_matches().await?;
    if purged > 0 {
        info!(purged, "removed match records without a log message");
    }

    let guild_id = config.guild_id;
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            on_error: |err| Box::pin(handle_error(err)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            commands: commands::all(),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                    .await?;
                let platform: Arc<dyn Platform> = Arc::new(DiscordPlatform::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    guild_id,
                ));
                let boards = Arc::new(Boards::new(
                    settings.clone(),
                    store.clone(),
                    platform.clone(),
                ));
                let matches = Arc::new(MatchManager::new(
                    settings.clone(),
                    store.clone(),
                    platform.clone(),
                    boards.clone(),
                ));
                let watcher = Arc::new(QueueWatcher::new(
                    settings.clone(),
                    store.clone(),
                    platform.clone(),
                    boards.clone(),
                    matches.clone(),
                ));
                if let Err(e) = boards.refresh_queue(None).await {
                    warn!("could not post queue summary: {}", e);
                }
                info!(guild = %guild_id, "queue ready");
                Ok(Data {
                    guild_id,
                    settings,
                    store,
                    platform,
                    boards,
                    matches,
                    watcher,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;
    client.start().await?;
    Ok(())
}
