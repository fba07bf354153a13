use std::num::NonZeroU64;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::LazyLock;

use crate::types::Data;
use anyhow::{bail, Error, Result};
use itertools::Itertools;
use regex::Regex;
use serenity::all::{User, UserId};

pub async fn handle_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(command = %ctx.command().name, "command failed: {:?}", error);
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!("error while handling error: {}", e);
            }
        }
    }
}

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Milliseconds since the epoch, strictly increasing within this process so
/// events in the same millisecond keep their arrival order.
pub fn now_millis() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let prev = LAST_MILLIS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(prev + 1)
}

pub fn format_id(id: &UserId) -> String {
    format!("<@{}>", id)
}

pub fn display_name(user: &User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

pub fn format_ids(ids: &[UserId]) -> String {
    ids.iter().map(format_id).join(", ")
}

/// Parses a snowflake stored as text. Zero and garbage yield `None`.
pub fn parse_snowflake<T: From<NonZeroU64>>(s: &str) -> Option<T> {
    s.trim().parse::<u64>().ok().and_then(NonZeroU64::new).map(T::from)
}

static SNOWFLAKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{16,19}$").expect("regex creation should succeed"));

/// Parses a comma separated list of ids or mentions (`<@123>`, `<#123>`, `<@&123>`).
pub fn parse_id_list<T: From<NonZeroU64>>(input: &str) -> Result<Vec<T>> {
    let mut ids = Vec::new();
    for raw in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let digits = raw.trim_start_matches(['<', '@', '#', '&', '!']).trim_end_matches('>');
        if !SNOWFLAKE.is_match(digits) {
            bail!("\"{raw}\" doesn't look like a valid id.");
        }
        match parse_snowflake(digits) {
            Some(id) => ids.push(id),
            None => bail!("\"{raw}\" doesn't look like a valid id."),
        }
    }
    Ok(ids)
}

/// Win rate in percent; zero when no games were played.
pub fn win_rate(wins: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64 * 100.0
    }
}
