use anyhow::Result;
use tracing::info;

use crate::types::{Context, Data};

async fn handle_reload(data: &Data) -> Result<String> {
    let settings = data.settings.reload()?;
    data.boards
        .refresh_queue(data.watcher.countdown_footer())
        .await?;
    info!(
        matches = settings.active_matches.len(),
        "configuration reloaded"
    );
    Ok("✅ Configuration reloaded successfully!".to_owned())
}

/// Reload the configuration file from disk
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn reload(ctx: Context<'_>) -> Result<()> {
    let resp = handle_reload(ctx.data())
        .await
        .unwrap_or_else(|e| format!("⚠️ Failed to reload configuration: {}", e));
    ctx.say(resp).await?;
    Ok(())
}
