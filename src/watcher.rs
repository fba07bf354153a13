//! Turns voice presence changes on the waiting channel into queue entries
//! and decides when a match starts.
//!
//! Five or more members start a 5Q match at once. Three or four members
//! start a countdown; if the count is still in that range when it expires,
//! a trio match starts. Only one match is constructed at a time.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serenity::all::{ChannelId, UserId};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::boards::Boards;
use crate::helpers::now_millis;
use crate::lifecycle::MatchManager;
use crate::model::{MatchKind, QueueEntry};
use crate::platform::Platform;
use crate::settings::SettingsStore;
use crate::store::Store;

/// Minimum waiting members for a trio countdown.
const TRIO_THRESHOLD: usize = 3;

/// A member's voice channel before and after a voice state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    pub user: UserId,
    pub is_bot: bool,
    pub previous: Option<ChannelId>,
    pub current: Option<ChannelId>,
}

struct Countdown {
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Holds the "match under construction" flag until dropped.
pub struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct QueueWatcher {
    settings: Arc<SettingsStore>,
    store: Arc<dyn Store>,
    platform: Arc<dyn Platform>,
    boards: Arc<Boards>,
    manager: Arc<MatchManager>,
    processing: AtomicBool,
    countdown: Mutex<Option<Countdown>>,
    generation: AtomicU64,
}

impl QueueWatcher {
    pub fn new(
        settings: Arc<SettingsStore>,
        store: Arc<dyn Store>,
        platform: Arc<dyn Platform>,
        boards: Arc<Boards>,
        manager: Arc<MatchManager>,
    ) -> Self {
        Self {
            settings,
            store,
            platform,
            boards,
            manager,
            processing: AtomicBool::new(false),
            countdown: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn countdown(&self) -> MutexGuard<'_, Option<Countdown>> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Footer for the queue summary while a trio countdown runs.
    pub fn countdown_footer(&self) -> Option<String> {
        self.countdown()
            .as_ref()
            .map(|c| countdown_text(c.deadline.saturating_duration_since(Instant::now())))
    }

    pub async fn handle_presence_change(self: &Arc<Self>, change: PresenceChange) {
        let Some(waiting) = self.settings.snapshot().waiting_channel_id else {
            return;
        };
        let joined = change.current == Some(waiting) && change.previous != change.current;
        let left = change.previous == Some(waiting) && change.current != Some(waiting);
        if !joined && !left {
            if change.current == Some(waiting) {
                debug!(user = %change.user, "voice state change inside waiting channel");
            }
            return;
        }

        if !change.is_bot {
            let mutation = if joined {
                debug!(user = %change.user, "joined queue");
                self.store.upsert_queue_entry(change.user, now_millis()).await
            } else {
                debug!(user = %change.user, "left queue");
                self.store.delete_queue_entry(change.user).await
            };
            if let Err(e) = mutation {
                error!(user = %change.user, "failed to update queue entry: {}", e);
            }
            if let Err(e) = self.boards.refresh_queue(self.countdown_footer()).await {
                warn!("could not refresh queue summary: {}", e);
            }
        }

        self.evaluate(waiting).await;
    }

    async fn evaluate(self: &Arc<Self>, waiting: ChannelId) {
        let count = self.eligible_members(waiting).await.len();
        if count >= MatchKind::FiveStack.size() {
            self.start(MatchKind::FiveStack, waiting).await;
        } else if count >= TRIO_THRESHOLD {
            if !self.processing.load(Ordering::Acquire) {
                self.start_countdown(waiting);
            }
        } else if self.cancel_countdown() {
            info!(count, "trio countdown cancelled");
            if let Err(e) = self.boards.refresh_queue(None).await {
                warn!("could not refresh queue summary: {}", e);
            }
        }
    }

    /// Draws the longest-waiting members and starts a match, unless another
    /// match is already under construction.
    async fn start(&self, kind: MatchKind, waiting: ChannelId) {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            debug!("match already under construction; dropping {} start", kind.label());
            return;
        };
        if kind == MatchKind::FiveStack && self.cancel_countdown() {
            debug!("trio countdown pre-empted by 5Q");
        }

        let entries = match self.store.list_queue_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("could not read queue: {}", e);
                return;
            }
        };
        let present = self.eligible_members(waiting).await;
        let players = longest_waiting(&present, &entries, kind.size());
        if players.len() < kind.size() {
            return;
        }

        for &player in &players {
            if let Err(e) = self.store.delete_queue_entry(player).await {
                warn!(user = %player, "could not remove drawn player from queue: {}", e);
            }
        }
        if let Err(e) = self.manager.start_match(players, kind).await {
            error!("failed to start {} match: {}", kind.label(), e);
        }
    }

    /// Members in the waiting channel who are not a player of an open match.
    async fn eligible_members(&self, waiting: ChannelId) -> Vec<UserId> {
        let in_match: HashSet<UserId> = self
            .settings
            .snapshot()
            .active_matches
            .values()
            .flat_map(|m| m.players.iter().copied())
            .collect();
        self.platform
            .voice_members(waiting)
            .await
            .into_iter()
            .filter(|u| !in_match.contains(u))
            .collect()
    }

    fn start_countdown(self: &Arc<Self>, waiting: ChannelId) {
        let mut slot = self.countdown();
        if slot.is_some() {
            return;
        }
        let settings = self.settings.snapshot();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let deadline = Instant::now() + settings.trio_countdown();
        let tick = settings.countdown_tick();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run_countdown(generation, deadline, tick, waiting).await;
        });
        *slot = Some(Countdown {
            generation,
            deadline,
            handle,
        });
        info!(secs = settings.trio_countdown_secs, "trio countdown started");
    }

    /// Aborts a running countdown. Returns whether one was running.
    fn cancel_countdown(&self) -> bool {
        match self.countdown().take() {
            Some(countdown) => {
                countdown.handle.abort();
                true
            }
            None => false,
        }
    }

    async fn run_countdown(
        self: Arc<Self>,
        generation: u64,
        deadline: Instant,
        tick: Duration,
        waiting: ChannelId,
    ) {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Err(e) = self.boards.refresh_queue(Some(countdown_text(remaining))).await {
                warn!("could not publish countdown: {}", e);
            }
            debug!(secs = remaining.as_secs(), "queue timer tick");
            sleep_until((Instant::now() + tick).min(deadline)).await;
        }

        {
            let mut slot = self.countdown();
            if slot.as_ref().map(|c| c.generation) != Some(generation) {
                return;
            }
            *slot = None;
        }

        let count = self.eligible_members(waiting).await.len();
        if (TRIO_THRESHOLD..MatchKind::FiveStack.size()).contains(&count) {
            self.start(MatchKind::Trio, waiting).await;
        } else {
            debug!(count, "trio countdown expired without a trio");
        }
        if let Err(e) = self.boards.refresh_queue(None).await {
            warn!("could not refresh queue summary: {}", e);
        }
    }

    #[cfg(test)]
    pub fn hold_processing(&self) -> Option<ProcessingGuard<'_>> {
        ProcessingGuard::acquire(&self.processing)
    }

    #[cfg(test)]
    pub fn countdown_running(&self) -> bool {
        self.countdown().is_some()
    }
}

fn countdown_text(remaining: Duration) -> String {
    format!("⏳ Auto-start Trio in {}s", remaining.as_millis().div_ceil(1000))
}

/// The `n` members of `present` who have waited longest. Members without a
/// queue entry rank after everyone with one.
pub fn longest_waiting(present: &[UserId], entries: &[QueueEntry], n: usize) -> Vec<UserId> {
    let mut ranked: Vec<(Option<i64>, UserId)> = present
        .iter()
        .map(|&user| {
            let joined_at = entries
                .iter()
                .find(|e| e.user_id == user)
                .map(|e| e.joined_at);
            (joined_at, user)
        })
        .collect();
    ranked.sort_by_key(|&(joined_at, user)| (joined_at.is_none(), joined_at, user));
    ranked.into_iter().take(n).map(|(_, user)| user).collect()
}
