//! Match lifecycle: start a match from drawn members, mark it finished, and
//! record its result.
//!
//! A match moves `InProgress -> AwaitingResult -> Recording` inside the
//! settings document and is removed from it once the result is stored.
//! Every transition is a single `try_update`, so two concurrent
//! `submit_result` calls cannot both claim the same match.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serenity::all::{ChannelId, UserId};
use tracing::{debug, error, info, warn};

use crate::boards::Boards;
use crate::error::QueueError;
use crate::helpers::{format_ids, now_millis};
use crate::model::{
    ActiveMatch, MatchId, MatchKind, MatchPhase, MatchRecord, MatchResult, MessageRef,
    NewMatchRecord,
};
use crate::platform::{
    BatchReport, ButtonKind, Card, MemberOutcome, Platform, PlatformError, COLOUR_GREEN,
    COLOUR_GREY, COLOUR_PURPLE, COLOUR_RED,
};
use crate::settings::SettingsStore;
use crate::store::Store;

/// How many finalized ids are remembered to tell a late duplicate
/// submission apart from an id that never existed.
const FINALIZED_MEMORY: usize = 64;

#[derive(Debug)]
pub struct StartReport {
    pub id: MatchId,
    pub channel: ChannelId,
    pub dms: BatchReport,
    pub moves: BatchReport,
    pub card: Option<MessageRef>,
}

#[derive(Debug)]
pub struct SubmitReport {
    pub id: MatchId,
    pub result: MatchResult,
    pub record: MatchRecord,
    pub moves: BatchReport,
}

pub struct MatchManager {
    settings: Arc<SettingsStore>,
    store: Arc<dyn Store>,
    platform: Arc<dyn Platform>,
    boards: Arc<Boards>,
    rng: Mutex<ChaCha8Rng>,
    finalized: Mutex<VecDeque<MatchId>>,
}

impl MatchManager {
    pub fn new(
        settings: Arc<SettingsStore>,
        store: Arc<dyn Store>,
        platform: Arc<dyn Platform>,
        boards: Arc<Boards>,
    ) -> Self {
        Self::with_seed(settings, store, platform, boards, rand::random())
    }

    /// A manager whose channel picks are reproducible.
    pub fn with_seed(
        settings: Arc<SettingsStore>,
        store: Arc<dyn Store>,
        platform: Arc<dyn Platform>,
        boards: Arc<Boards>,
        seed: u64,
    ) -> Self {
        Self {
            settings,
            store,
            platform,
            boards,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            finalized: Mutex::new(VecDeque::with_capacity(FINALIZED_MEMORY)),
        }
    }

    fn finalized(&self) -> MutexGuard<'_, VecDeque<MatchId>> {
        self.finalized.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a match of `kind` for `players` in a random channel of the kind's pool.
    ///
    /// DMs and moves are best effort; their per-member outcomes are returned
    /// and the match starts regardless.
    pub async fn start_match(
        &self,
        players: Vec<UserId>,
        kind: MatchKind,
    ) -> Result<StartReport, QueueError> {
        let settings = self.settings.snapshot();
        let channel = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            settings
                .channel_pool(kind)
                .choose(&mut *rng)
                .copied()
                .ok_or(QueueError::NoChannels(kind))?
        };

        let id = MatchId::next(kind);
        let active = ActiveMatch {
            id,
            kind,
            players: players.clone(),
            target_channel_id: channel,
            card: None,
            started_at: id.started_at,
            phase: MatchPhase::InProgress,
        };
        self.settings.update(|s| {
            s.active_matches.insert(id.to_string(), active.clone());
        })?;

        let notice = format!(
            "🎮 Your {} match is about to begin! You're being moved to <#{}>.",
            kind.label(),
            channel
        );
        let mut dms = BatchReport::default();
        for &player in &players {
            let outcome = match self.platform.send_direct_message(player, &notice).await {
                Ok(()) => MemberOutcome::Done,
                Err(e) => {
                    warn!(user = %player, match_id = %id, "could not DM player: {}", e);
                    MemberOutcome::Failed(e)
                }
            };
            dms.push(player, outcome);
        }

        let mut moves = BatchReport::default();
        for &player in &players {
            let outcome = match self.platform.move_member(player, channel).await {
                Ok(()) => MemberOutcome::Done,
                Err(e) => {
                    warn!(user = %player, match_id = %id, "could not move player: {}", e);
                    MemberOutcome::Failed(e)
                }
            };
            moves.push(player, outcome);
        }

        let card = match settings.queue_message_channel_id {
            Some(text_channel) => {
                match self.platform.post_message(text_channel, started_card(&active)).await {
                    Ok(card) => Some(card),
                    Err(e) => {
                        warn!(match_id = %id, "could not post match card: {}", e);
                        None
                    }
                }
            }
            None => {
                warn!(match_id = %id, "no text channel configured for match cards");
                None
            }
        };
        if let Some(card) = card {
            self.settings.update(|s| {
                if let Some(m) = s.active_matches.get_mut(&id.to_string()) {
                    m.card = Some(card);
                }
            })?;
        }

        info!(
            match_id = %id,
            channel = %channel,
            moved = moves.done(),
            "started {} match with {} players",
            kind.label(),
            players.len()
        );

        if let Err(e) = self.boards.refresh_queue(None).await {
            warn!("could not refresh queue summary after match start: {}", e);
        }

        Ok(StartReport {
            id,
            channel,
            dms,
            moves,
            card,
        })
    }

    /// Marks a running match as finished and swaps its card controls for the
    /// win/loss selection.
    pub async fn mark_finished(&self, id: MatchId) -> Result<(), QueueError> {
        let key = id.to_string();
        let active = self.settings.try_update(|s| {
            let m = s
                .active_matches
                .get_mut(&key)
                .ok_or_else(|| QueueError::NotFound(key.clone()))?;
            if m.phase != MatchPhase::InProgress {
                return Err(QueueError::AlreadyFinished(key.clone()));
            }
            m.phase = MatchPhase::AwaitingResult;
            Ok(m.clone())
        })?;

        let card = finished_card(&active);
        if let Some(existing) = active.card {
            match self.platform.edit_message(existing, card.clone()).await {
                Ok(()) => {
                    debug!(match_id = %id, "match awaiting result");
                    return Ok(());
                }
                Err(e) => warn!(match_id = %id, "match card is gone, posting a new one: {}", e),
            }
        }

        let channel = active
            .card
            .map(|c| c.channel_id)
            .or(self.settings.snapshot().queue_message_channel_id);
        let Some(channel) = channel else {
            warn!(match_id = %id, "no channel to post the result selection in");
            return Ok(());
        };
        let posted = self.platform.post_message(channel, card).await?;
        self.settings.update(|s| {
            if let Some(m) = s.active_matches.get_mut(&key) {
                m.card = Some(posted);
            }
        })?;
        debug!(match_id = %id, "match awaiting result");
        Ok(())
    }

    /// Records the result of a match awaiting one, returns its players to the
    /// lobby and puts them back in the queue.
    ///
    /// Fails with `NotPending` unless the match is awaiting a result, which
    /// includes a second submission for a match that was already recorded.
    pub async fn submit_result(
        &self,
        id: MatchId,
        result: MatchResult,
    ) -> Result<SubmitReport, QueueError> {
        let key = id.to_string();
        let active = self.settings.try_update(|s| {
            let Some(m) = s.active_matches.get_mut(&key) else {
                return Err(if self.finalized().contains(&id) {
                    QueueError::NotPending(key.clone())
                } else {
                    QueueError::NotFound(key.clone())
                });
            };
            if !m.pending_result() {
                return Err(QueueError::NotPending(key.clone()));
            }
            m.phase = MatchPhase::Recording;
            Ok(m.clone())
        })?;

        let settings = self.settings.snapshot();
        let moves = self.return_to_lobby(&active, settings.lobby_channel()).await;
        let finished_at = now_millis();

        if let Some(card) = active.card {
            if let Err(e) = self
                .platform
                .edit_message(card, result_card(&active, result))
                .await
            {
                warn!(match_id = %id, "could not show result on match card: {}", e);
            }
        }

        let log = match settings.match_history_channel_id {
            Some(channel) => match self
                .platform
                .post_message(channel, log_card(&active, result))
                .await
            {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!(match_id = %id, "could not post match log: {}", e);
                    None
                }
            },
            None => {
                warn!("match history channel not configured");
                None
            }
        };

        let record = self
            .store
            .append_match_record(NewMatchRecord {
                kind: active.kind,
                player_ids: active.players.clone(),
                result,
                started_at: active.started_at,
                finished_at,
                log,
            })
            .await;

        for &player in &active.players {
            if let Err(e) = self.store.upsert_queue_entry(player, now_millis()).await {
                warn!(user = %player, "could not requeue player: {}", e);
            }
        }

        if let Err(e) = self.settings.update(|s| {
            s.active_matches.remove(&key);
        }) {
            error!(match_id = %id, "could not save match removal: {}", e);
            self.settings.forget_match(&key);
        }
        {
            let mut finalized = self.finalized();
            if finalized.len() == FINALIZED_MEMORY {
                finalized.pop_front();
            }
            finalized.push_back(id);
        }

        if let Err(e) = self.boards.refresh_leaderboard().await {
            warn!("could not refresh leaderboard: {}", e);
        }
        if let Err(e) = self.boards.refresh_queue(None).await {
            warn!("could not refresh queue summary after result: {}", e);
        }

        if let Some(card) = active.card {
            self.schedule_card_deletion(card, settings.match_delete_delay_minutes);
        }

        let record = record?;
        info!(
            match_id = %id,
            record = record.id,
            "recorded {} for {} match",
            result.as_str(),
            active.kind.label()
        );
        Ok(SubmitReport {
            id,
            result,
            record,
            moves,
        })
    }

    async fn return_to_lobby(&self, active: &ActiveMatch, lobby: Option<ChannelId>) -> BatchReport {
        let mut moves = BatchReport::default();
        for &player in &active.players {
            let Some(lobby) = lobby else {
                moves.push(player, MemberOutcome::Skipped("no lobby configured"));
                continue;
            };
            let outcome = match self.platform.member_voice_channel(player).await {
                None => MemberOutcome::Skipped("not in voice"),
                Some(current) if current == lobby => MemberOutcome::Skipped("already in lobby"),
                Some(_) => match self.platform.move_member(player, lobby).await {
                    Ok(()) => MemberOutcome::Done,
                    Err(PlatformError::MemberGone(_)) => MemberOutcome::Skipped("left the guild"),
                    Err(e) => {
                        warn!(user = %player, match_id = %active.id, "could not return player to lobby: {}", e);
                        MemberOutcome::Failed(e)
                    }
                },
            };
            moves.push(player, outcome);
        }
        moves
    }

    fn schedule_card_deletion(&self, card: MessageRef, delay_minutes: u64) {
        if delay_minutes == 0 {
            return;
        }
        let platform = self.platform.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_minutes * 60)).await;
            match platform.delete_message(card).await {
                Ok(()) => debug!(message = %card.message_id, "deleted finished match card"),
                Err(e) => warn!(message = %card.message_id, "could not delete match card: {}", e),
            }
        });
    }
}

fn players_line(active: &ActiveMatch) -> String {
    format!(
        "**Players ({})**\n> {}",
        active.players.len(),
        format_ids(&active.players)
    )
}

fn started_card(active: &ActiveMatch) -> Card {
    let colour = match active.kind {
        MatchKind::FiveStack => COLOUR_PURPLE,
        MatchKind::Trio => COLOUR_GREEN,
    };
    Card::new(
        format!("🎮 {} Match Started!", active.kind.label()),
        format!(
            "{}\n\n➡️ Moved to <#{}>",
            players_line(active),
            active.target_channel_id
        ),
        colour,
    )
    .button(
        format!("finish_match_{}", active.id),
        "🏁 Finish Match",
        ButtonKind::Success,
    )
    .timestamped()
}

fn finished_card(active: &ActiveMatch) -> Card {
    Card::new(
        "🏁 Match Finished — Choose Result",
        players_line(active),
        COLOUR_GREY,
    )
    .button(format!("result_win_{}", active.id), "✅ Win", ButtonKind::Success)
    .button(format!("result_loss_{}", active.id), "❌ Loss", ButtonKind::Danger)
}

fn result_text(result: MatchResult) -> &'static str {
    match result {
        MatchResult::Win => "✅ **Win**",
        MatchResult::Loss => "❌ **Loss**",
    }
}

fn result_colour(result: MatchResult) -> u32 {
    match result {
        MatchResult::Win => COLOUR_GREEN,
        MatchResult::Loss => COLOUR_RED,
    }
}

fn result_card(active: &ActiveMatch, result: MatchResult) -> Card {
    Card::new(
        format!("🏆 Match Result: {}", result_text(result)),
        players_line(active),
        result_colour(result),
    )
}

fn log_card(active: &ActiveMatch, result: MatchResult) -> Card {
    Card::new(
        format!("🎯 {} Match Result", active.kind.label()),
        format!("{}\n\n{}", result_text(result), players_line(active)),
        result_colour(result),
    )
    .timestamped()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        test_settings, user, Harness, FIVE_A, FIVE_B, HISTORY, LOBBY, QUEUE_TEXT, TRIO, WAITING,
    };

    fn trio() -> Vec<UserId> {
        vec![user(1), user(2), user(3)]
    }

    async fn started(h: &Harness) -> StartReport {
        h.platform.with(|s| {
            for u in trio() {
                s.voice.insert(u, WAITING);
            }
        });
        h.manager.start_match(trio(), MatchKind::Trio).await.unwrap()
    }

    #[tokio::test]
    async fn start_moves_players_and_posts_card() {
        let h = Harness::new();
        let report = started(&h).await;

        assert_eq!(report.channel, TRIO);
        assert_eq!(report.dms.done(), 3);
        assert_eq!(report.moves.done(), 3);
        for u in trio() {
            assert_eq!(h.platform.with(|s| s.voice.get(&u).copied()), Some(TRIO));
        }

        let active = h.settings.snapshot().active_matches[&report.id.to_string()].clone();
        assert_eq!(active.phase, MatchPhase::InProgress);
        assert_eq!(active.players, trio());
        assert_eq!(active.card, report.card);

        let cards: Vec<_> = h
            .platform
            .posted_in(QUEUE_TEXT)
            .into_iter()
            .filter(|(_, c)| !c.buttons.is_empty())
            .collect();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].1.buttons[0].custom_id, format!("finish_match_{}", report.id));
    }

    #[tokio::test]
    async fn five_stack_channel_comes_from_its_pool() {
        let h = Harness::new();
        let players: Vec<_> = (1..=5).map(user).collect();
        let report = h
            .manager
            .start_match(players, MatchKind::FiveStack)
            .await
            .unwrap();
        assert!([FIVE_A, FIVE_B].contains(&report.channel));
    }

    #[tokio::test]
    async fn member_failures_do_not_stop_the_match() {
        let h = Harness::new();
        h.platform.with(|s| {
            s.failing_dms.insert(user(1));
            s.failing_moves.insert(user(2));
        });
        let report = started(&h).await;

        assert_eq!(report.dms.failed(), vec![user(1)]);
        assert_eq!(report.moves.failed(), vec![user(2)]);
        assert_eq!(report.moves.done(), 2);
        assert!(h
            .settings
            .snapshot()
            .active_matches
            .contains_key(&report.id.to_string()));
    }

    #[tokio::test]
    async fn empty_pool_is_rejected() {
        let h = Harness::new();
        h.settings.update(|s| s.trio_channel_ids.clear()).unwrap();
        let err = h
            .manager
            .start_match(trio(), MatchKind::Trio)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NoChannels(MatchKind::Trio)));
        assert!(h.settings.snapshot().active_matches.is_empty());
    }

    #[tokio::test]
    async fn finish_swaps_controls_for_result_buttons() {
        let h = Harness::new();
        let report = started(&h).await;
        h.manager.mark_finished(report.id).await.unwrap();

        let edits = h.platform.with(|s| s.edits.clone());
        let (message, card) = edits.last().unwrap();
        assert_eq!(Some(*message), report.card);
        let ids: Vec<_> = card.buttons.iter().map(|b| b.custom_id.clone()).collect();
        assert_eq!(
            ids,
            vec![format!("result_win_{}", report.id), format!("result_loss_{}", report.id)]
        );

        let err = h.manager.mark_finished(report.id).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyFinished(_)));
    }

    #[tokio::test]
    async fn finish_reposts_missing_card() {
        let h = Harness::new();
        let report = started(&h).await;
        let old = report.card.unwrap();
        h.platform.with(|s| s.live.remove(&old));

        h.manager.mark_finished(report.id).await.unwrap();
        let card = h.settings.snapshot().active_matches[&report.id.to_string()]
            .card
            .unwrap();
        assert_ne!(card, old);
        assert!(h.platform.message_exists(card).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_match_is_not_found() {
        let h = Harness::new();
        let id = MatchId::next(MatchKind::Trio);
        assert!(matches!(
            h.manager.mark_finished(id).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(matches!(
            h.manager.submit_result(id, MatchResult::Win).await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn result_requires_finish_first() {
        let h = Harness::new();
        let report = started(&h).await;
        let err = h
            .manager
            .submit_result(report.id, MatchResult::Win)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotPending(_)));
        assert!(h.store.records().is_empty());
    }

    #[tokio::test]
    async fn double_submission_records_once() {
        let h = Harness::new();
        let report = started(&h).await;
        h.manager.mark_finished(report.id).await.unwrap();

        let first = h
            .manager
            .submit_result(report.id, MatchResult::Win)
            .await
            .unwrap();
        assert_eq!(first.record.result, MatchResult::Win);

        let second = h
            .manager
            .submit_result(report.id, MatchResult::Win)
            .await
            .unwrap_err();
        assert!(matches!(second, QueueError::NotPending(_)));
        assert_eq!(h.store.records().len(), 1);
        assert!(h.settings.snapshot().active_matches.is_empty());
    }

    #[tokio::test]
    async fn recording_match_rejects_submit_and_finish() {
        let h = Harness::new();
        let report = started(&h).await;
        h.settings
            .update(|s| {
                if let Some(m) = s.active_matches.get_mut(&report.id.to_string()) {
                    m.phase = MatchPhase::Recording;
                }
            })
            .unwrap();

        assert!(matches!(
            h.manager.submit_result(report.id, MatchResult::Loss).await,
            Err(QueueError::NotPending(_))
        ));
        assert!(matches!(
            h.manager.mark_finished(report.id).await,
            Err(QueueError::AlreadyFinished(_))
        ));
        assert!(h.store.records().is_empty());
    }

    #[tokio::test]
    async fn forgotten_finalized_id_is_not_found() {
        let h = Harness::new();
        let mut ids = Vec::new();
        for _ in 0..=FINALIZED_MEMORY {
            let report = started(&h).await;
            h.manager.mark_finished(report.id).await.unwrap();
            h.manager
                .submit_result(report.id, MatchResult::Win)
                .await
                .unwrap();
            ids.push(report.id);
        }

        assert!(matches!(
            h.manager.submit_result(ids[0], MatchResult::Win).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(matches!(
            h.manager.submit_result(ids[1], MatchResult::Win).await,
            Err(QueueError::NotPending(_))
        ));
        assert_eq!(h.store.records().len(), FINALIZED_MEMORY + 1);
    }

    #[tokio::test]
    async fn unsaved_removal_still_closes_the_match() {
        let path = std::env::temp_dir()
            .join(format!("ranked-queue-lifecycle-{}.json", rand::random::<u64>()));
        let settings = SettingsStore::load(&path).unwrap();
        settings.update(|s| *s = test_settings()).unwrap();
        let h = Harness::with_settings_store(Arc::new(settings));
        let report = started(&h).await;
        h.manager.mark_finished(report.id).await.unwrap();

        // once the log card is posted, the settings file can no longer be replaced
        let blocker = path.with_extension("json.tmp");
        let hook_path = blocker.clone();
        h.platform.with(|s| {
            s.on_post = Some(Box::new(move |channel| {
                if channel == HISTORY {
                    let _ = std::fs::create_dir(&hook_path);
                }
            }))
        });

        let outcome = h
            .manager
            .submit_result(report.id, MatchResult::Win)
            .await
            .unwrap();
        assert_eq!(outcome.record.result, MatchResult::Win);
        assert!(h.settings.snapshot().active_matches.is_empty());
        assert!(matches!(
            h.manager.submit_result(report.id, MatchResult::Win).await,
            Err(QueueError::NotPending(_))
        ));
        assert!(matches!(
            h.manager.mark_finished(report.id).await,
            Err(QueueError::NotFound(_))
        ));
        assert_eq!(h.store.records().len(), 1);

        let _ = std::fs::remove_dir(&blocker);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn result_returns_players_and_requeues_them() {
        let h = Harness::new();
        let report = started(&h).await;
        h.manager.mark_finished(report.id).await.unwrap();

        let submitted_at = now_millis();
        let outcome = h
            .manager
            .submit_result(report.id, MatchResult::Loss)
            .await
            .unwrap();

        assert_eq!(outcome.moves.done(), 3);
        for u in trio() {
            assert_eq!(h.platform.with(|s| s.voice.get(&u).copied()), Some(LOBBY));
            assert!(h.store.joined_at(u).unwrap() >= submitted_at);
        }

        let record = &h.store.records()[0];
        assert_eq!(record.player_ids, trio());
        assert_eq!(record.kind, MatchKind::Trio);
        let log = h.platform.posted_in(HISTORY);
        assert_eq!(log.len(), 1);
        assert_eq!(record.log, Some(log[0].0));
    }

    #[tokio::test]
    async fn players_who_left_are_skipped() {
        let h = Harness::new();
        let report = started(&h).await;
        h.manager.mark_finished(report.id).await.unwrap();
        h.platform.with(|s| {
            s.gone.insert(user(1));
            s.voice.remove(&user(2));
            s.voice.insert(user(3), LOBBY);
        });

        let outcome = h
            .manager
            .submit_result(report.id, MatchResult::Win)
            .await
            .unwrap();
        assert_eq!(outcome.moves.done(), 0);
        assert_eq!(outcome.moves.skipped(), 3);
        assert!(outcome.moves.failed().is_empty());
        assert_eq!(h.store.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn card_is_deleted_after_delay() {
        let h = Harness::new();
        let report = started(&h).await;
        h.manager.mark_finished(report.id).await.unwrap();
        h.manager
            .submit_result(report.id, MatchResult::Win)
            .await
            .unwrap();
        let card = report.card.unwrap();

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert!(h.platform.message_exists(card).await.unwrap());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!h.platform.message_exists(card).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_keeps_card() {
        let h = Harness::new();
        h.settings
            .update(|s| s.match_delete_delay_minutes = 0)
            .unwrap();
        let report = started(&h).await;
        h.manager.mark_finished(report.id).await.unwrap();
        h.manager
            .submit_result(report.id, MatchResult::Loss)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(h.platform.message_exists(report.card.unwrap()).await.unwrap());
    }
}
