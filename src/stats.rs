//! Aggregation over match history for `/stats` and the leaderboard.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serenity::all::UserId;

use crate::helpers::win_rate;
use crate::model::{MatchKind, MatchRecord, MatchResult};
use crate::platform::{Card, COLOUR_GOLD, COLOUR_GREY};

pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, poise::ChoiceParameter)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardFilter {
    #[name = "All"]
    All,
    #[name = "5Q"]
    #[serde(rename = "5q")]
    FiveStack,
    #[name = "Trio"]
    Trio,
}

impl LeaderboardFilter {
    pub fn kind(self) -> Option<MatchKind> {
        match self {
            LeaderboardFilter::All => None,
            LeaderboardFilter::FiveStack => Some(MatchKind::FiveStack),
            LeaderboardFilter::Trio => Some(MatchKind::Trio),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, poise::ChoiceParameter)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardSort {
    #[name = "Matches Played"]
    Matches,
    #[name = "Winrate"]
    Winrate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub user_id: UserId,
    pub total: usize,
    pub wins: usize,
    pub win_rate: f64,
}

/// Top players over `records`, ranked by `sort` with the other metric as tie-break.
pub fn leaderboard(
    records: &[MatchRecord],
    filter: LeaderboardFilter,
    sort: LeaderboardSort,
) -> Vec<LeaderboardRow> {
    let mut tally: HashMap<UserId, (usize, usize)> = HashMap::new();
    for record in records
        .iter()
        .filter(|r| filter.kind().map_or(true, |k| k == r.kind))
    {
        for player in &record.player_ids {
            let (total, wins) = tally.entry(*player).or_default();
            *total += 1;
            if record.result == MatchResult::Win {
                *wins += 1;
            }
        }
    }

    let mut rows: Vec<_> = tally
        .into_iter()
        .map(|(user_id, (total, wins))| LeaderboardRow {
            user_id,
            total,
            wins,
            win_rate: win_rate(wins, total),
        })
        .collect();

    rows.sort_by(|a, b| {
        let by_total = b.total.cmp(&a.total);
        let by_rate = b.win_rate.total_cmp(&a.win_rate);
        match sort {
            LeaderboardSort::Matches => by_total.then(by_rate),
            LeaderboardSort::Winrate => by_rate.then(by_total),
        }
        .then(a.user_id.cmp(&b.user_id))
    });
    rows.truncate(LEADERBOARD_SIZE);
    rows
}

pub fn leaderboard_card(rows: &[LeaderboardRow], filter: LeaderboardFilter) -> Card {
    if rows.is_empty() {
        return Card::new("🏆 Leaderboard", "_No matches recorded yet._", COLOUR_GREY);
    }
    let title = match filter.kind() {
        None => "🏆 Overall Leaderboard".to_owned(),
        Some(kind) => format!("🏆 {} Leaderboard", kind.label()),
    };
    let lines = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "**#{}** <@{}> — {} games | {} wins | {:.1}% WR",
                i + 1,
                r.user_id,
                r.total,
                r.wins,
                r.win_rate
            )
        })
        .join("\n");
    Card::new(title, lines, COLOUR_GOLD).timestamped()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    pub games: usize,
    pub wins: usize,
}

impl KindStats {
    fn add(&mut self, result: MatchResult) {
        self.games += 1;
        if result == MatchResult::Win {
            self.wins += 1;
        }
    }

    pub fn win_rate(&self) -> f64 {
        win_rate(self.wins, self.games)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub overall: KindStats,
    pub five_stack: KindStats,
    pub trio: KindStats,
}

pub fn player_stats(records: &[MatchRecord], user: UserId) -> PlayerStats {
    let mut stats = PlayerStats::default();
    for record in records.iter().filter(|r| r.player_ids.contains(&user)) {
        stats.overall.add(record.result);
        match record.kind {
            MatchKind::FiveStack => stats.five_stack.add(record.result),
            MatchKind::Trio => stats.trio.add(record.result),
        }
    }
    stats
}
