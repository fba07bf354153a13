mod config;
mod history;
mod leaderboard;
mod players;
mod queue;
mod reload;
mod stats;

use crate::types::Data;

pub fn all() -> Vec<poise::Command<Data, anyhow::Error>> {
    vec![
        queue::queue(),
        players::registermlbb(),
        players::profile(),
        stats::stats(),
        history::history(),
        leaderboard::leaderboard(),
        config::config(),
        reload::reload(),
    ]
}
