//! Persistent state: queue membership, registered players and match history.

mod database;
pub mod entity;
#[cfg(test)]
mod memory;

pub use database::DbStore;
#[cfg(test)]
pub use memory::MemoryStore;

use serenity::all::UserId;
use serenity::async_trait;
use thiserror::Error;

use crate::model::{MatchKind, MatchRecord, NewMatchRecord, Player, QueueEntry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt {table} row {key}: {reason}")]
    Corrupt {
        table: &'static str,
        key: String,
        reason: String,
    },
}

/// Which history records to return.
#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub kind: Option<MatchKind>,
    pub player: Option<UserId>,
    /// Applied to the newest records before the player filter.
    pub scan_limit: Option<u64>,
}

impl MatchFilter {
    pub fn matches(&self, record: &MatchRecord) -> bool {
        self.kind.map_or(true, |k| k == record.kind)
            && self.player.map_or(true, |p| record.player_ids.contains(&p))
    }
}

/// Storage operations used by the queue and the reporters.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts the entry, or replaces `joined_at` if the member is already queued.
    async fn upsert_queue_entry(&self, user: UserId, joined_at: i64) -> Result<(), StoreError>;

    async fn delete_queue_entry(&self, user: UserId) -> Result<(), StoreError>;

    /// All entries, longest waiting first.
    async fn list_queue_entries(&self) -> Result<Vec<QueueEntry>, StoreError>;

    async fn clear_queue(&self) -> Result<(), StoreError>;

    async fn append_match_record(&self, record: NewMatchRecord)
        -> Result<MatchRecord, StoreError>;

    /// Records matching `filter`, newest first.
    async fn query_match_records(&self, filter: MatchFilter)
        -> Result<Vec<MatchRecord>, StoreError>;

    async fn delete_match_record(&self, id: i32) -> Result<(), StoreError>;

    /// Deletes history rows that never got a log message. Returns how many were removed.
    async fn purge_unlogged_matches(&self) -> Result<u64, StoreError>;

    async fn upsert_player(&self, player: Player) -> Result<(), StoreError>;

    async fn get_player(&self, user: UserId) -> Result<Option<Player>, StoreError>;
}
