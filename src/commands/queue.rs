use anyhow::Result;
use itertools::Itertools;
use tracing::info;

use crate::types::{Context, Data};

async fn handle_show(data: &Data) -> Result<String> {
    let entries = data.store.list_queue_entries().await?;
    let text = if entries.is_empty() {
        "_No one in queue._".to_owned()
    } else {
        entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}. <@{}>", i + 1, e.user_id))
            .join("\n")
    };
    Ok(format!("**Current Queue:**\n{text}"))
}

async fn handle_clear(data: &Data) -> Result<String> {
    data.store.clear_queue().await?;
    data.boards.refresh_queue(data.watcher.countdown_footer()).await?;
    Ok("Queue cleared ✅".to_owned())
}

/// Inspect or reset the ranked queue
#[poise::command(slash_command, subcommands("show", "clear"), subcommand_required)]
pub async fn queue(_: Context<'_>) -> Result<()> {
    Ok(())
}

/// Show the current queue, longest waiting first
#[poise::command(slash_command, ephemeral)]
pub async fn show(ctx: Context<'_>) -> Result<()> {
    let resp = handle_show(ctx.data())
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}

/// Remove everyone from the queue
#[poise::command(slash_command, ephemeral, required_permissions = "ADMINISTRATOR")]
pub async fn clear(ctx: Context<'_>) -> Result<()> {
    info!(user = %ctx.author().id, "/queue clear");
    let resp = handle_clear(ctx.data())
        .await
        .unwrap_or_else(|e| format!("Error: {}", e));
    ctx.say(resp).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::testing::{user, Harness};

    #[tokio::test]
    async fn show_lists_in_join_order() {
        let h = Harness::new();
        h.store.upsert_queue_entry(user(2), 5).await.unwrap();
        h.store.upsert_queue_entry(user(1), 9).await.unwrap();
        let text = handle_show(&h.data()).await.unwrap();
        assert_eq!(text, "**Current Queue:**\n1. <@2>\n2. <@1>");
    }

    #[tokio::test]
    async fn clear_empties_queue() {
        let h = Harness::new();
        h.store.upsert_queue_entry(user(1), 1).await.unwrap();
        handle_clear(&h.data()).await.unwrap();
        assert!(h.store.queued().is_empty());
        assert!(handle_show(&h.data()).await.unwrap().contains("No one in queue"));
    }
}
