//! The admin-editable settings document (channel ids, timers, in-flight matches).
//!
//! The document lives in memory behind a lock and is written to disk after
//! every successful mutation, before the lock is released.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, MessageId, RoleId};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{ActiveMatch, MatchKind};
use crate::stats::{LeaderboardFilter, LeaderboardSort};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Voice channel members join to queue up.
    pub waiting_channel_id: Option<ChannelId>,
    /// Voice channel players return to after a match; falls back to the waiting channel.
    pub lobby_channel_id: Option<ChannelId>,
    /// Text channel holding the queue summary and match cards.
    pub queue_message_channel_id: Option<ChannelId>,
    pub queue_message_id: Option<MessageId>,
    pub five_stack_channel_ids: Vec<ChannelId>,
    pub trio_channel_ids: Vec<ChannelId>,
    pub queue_size: usize,
    pub allowed_role_ids: Vec<RoleId>,
    pub trio_countdown_secs: u64,
    pub countdown_tick_secs: u64,
    /// Zero keeps finished match cards forever.
    pub match_delete_delay_minutes: u64,
    pub match_history_channel_id: Option<ChannelId>,
    pub leaderboard_channel_id: Option<ChannelId>,
    pub leaderboard_message_id: Option<MessageId>,
    pub leaderboard_filter: LeaderboardFilter,
    pub leaderboard_sort: LeaderboardSort,
    pub active_matches: BTreeMap<String, ActiveMatch>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            waiting_channel_id: None,
            lobby_channel_id: None,
            queue_message_channel_id: None,
            queue_message_id: None,
            five_stack_channel_ids: Vec::new(),
            trio_channel_ids: Vec::new(),
            queue_size: 5,
            allowed_role_ids: Vec::new(),
            trio_countdown_secs: 300,
            countdown_tick_secs: 30,
            match_delete_delay_minutes: 5,
            match_history_channel_id: None,
            leaderboard_channel_id: None,
            leaderboard_message_id: None,
            leaderboard_filter: LeaderboardFilter::All,
            leaderboard_sort: LeaderboardSort::Matches,
            active_matches: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn lobby_channel(&self) -> Option<ChannelId> {
        self.lobby_channel_id.or(self.waiting_channel_id)
    }

    pub fn channel_pool(&self, kind: MatchKind) -> &[ChannelId] {
        match kind {
            MatchKind::FiveStack => &self.five_stack_channel_ids,
            MatchKind::Trio => &self.trio_channel_ids,
        }
    }

    pub fn trio_countdown(&self) -> Duration {
        Duration::from_secs(self.trio_countdown_secs)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_secs(self.countdown_tick_secs.max(1))
    }
}

/// Shared handle to the settings document.
pub struct SettingsStore {
    path: Option<PathBuf>,
    inner: Mutex<Settings>,
}

impl SettingsStore {
    /// Loads the document from `path`, writing defaults when the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = match read_settings(&path)? {
            Some(settings) => {
                info!(path = %path.display(), matches = settings.active_matches.len(), "loaded settings");
                settings
            }
            None => {
                info!(path = %path.display(), "settings file not found; writing defaults");
                let settings = Settings::default();
                write_settings(&path, &settings)?;
                settings
            }
        };
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(settings),
        })
    }

    /// A store that never touches the disk.
    #[cfg(test)]
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            inner: Mutex::new(settings),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        // a panic while holding the lock leaves a complete document behind
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Settings {
        self.lock().clone()
    }

    /// Applies `f` and persists the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> Result<R, SettingsError> {
        self.try_update(|settings| Ok::<_, SettingsError>(f(settings)))
    }

    /// Applies `f` on a copy of the document; the copy replaces the document
    /// and is persisted only when `f` succeeds.
    ///
    /// The write happens under the lock and blocks the calling worker for the
    /// duration of one small file write.
    pub fn try_update<R, E>(&self, f: impl FnOnce(&mut Settings) -> Result<R, E>) -> Result<R, E>
    where
        E: From<SettingsError>,
    {
        let mut guard = self.lock();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        if let Some(path) = &self.path {
            write_settings(path, &draft)?;
        }
        *guard = draft;
        Ok(out)
    }

    /// Drops an active match from memory only; the file catches up on the
    /// next successful write.
    pub fn forget_match(&self, key: &str) {
        self.lock().active_matches.remove(key);
    }

    /// Re-reads the document from disk. In-flight matches of this process are kept.
    pub fn reload(&self) -> Result<Settings, SettingsError> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot());
        };
        let mut fresh = read_settings(path)?.unwrap_or_default();
        let mut guard = self.lock();
        fresh.active_matches = std::mem::take(&mut guard.active_matches);
        *guard = fresh.clone();
        debug!(path = %path.display(), "reloaded settings");
        Ok(fresh)
    }
}

fn read_settings(path: &Path) -> Result<Option<Settings>, SettingsError> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| SettingsError::Parse {
                path: path.to_owned(),
                source,
            }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SettingsError::Read {
            path: path.to_owned(),
            source,
        }),
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let write_err = |source: std::io::Error| SettingsError::Write {
        path: path.to_owned(),
        source,
    };
    let json = serde_json::to_string_pretty(settings).map_err(|e| write_err(e.into()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}
