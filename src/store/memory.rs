use std::collections::HashMap;
use std::sync::Mutex;

use serenity::all::UserId;
use serenity::async_trait;

use super::{MatchFilter, Store, StoreError};
use crate::model::{MatchRecord, NewMatchRecord, Player, QueueEntry};

/// In-memory store for exercising the queue without a database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    queue: HashMap<UserId, i64>,
    records: Vec<MatchRecord>,
    players: HashMap<UserId, Player>,
    next_id: i32,
}

impl MemoryStore {
    pub fn records(&self) -> Vec<MatchRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn queued(&self) -> Vec<UserId> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<_> = inner.queue.iter().map(|(u, t)| (*t, *u)).collect();
        entries.sort();
        entries.into_iter().map(|(_, u)| u).collect()
    }

    pub fn joined_at(&self, user: UserId) -> Option<i64> {
        self.inner.lock().unwrap().queue.get(&user).copied()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_queue_entry(&self, user: UserId, joined_at: i64) -> Result<(), StoreError> {
        self.inner.lock().unwrap().queue.insert(user, joined_at);
        Ok(())
    }

    async fn delete_queue_entry(&self, user: UserId) -> Result<(), StoreError> {
        self.inner.lock().unwrap().queue.remove(&user);
        Ok(())
    }

    async fn list_queue_entries(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<_> = inner
            .queue
            .iter()
            .map(|(&user_id, &joined_at)| QueueEntry { user_id, joined_at })
            .collect();
        entries.sort_by_key(|e| (e.joined_at, e.user_id));
        Ok(entries)
    }

    async fn clear_queue(&self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().queue.clear();
        Ok(())
    }

    async fn append_match_record(
        &self,
        record: NewMatchRecord,
    ) -> Result<MatchRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let stored = MatchRecord {
            id: inner.next_id,
            kind: record.kind,
            player_ids: record.player_ids,
            result: record.result,
            started_at: record.started_at,
            finished_at: record.finished_at,
            log: record.log,
        };
        inner.records.push(stored.clone());
        Ok(stored)
    }

    async fn query_match_records(
        &self,
        filter: MatchFilter,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<_> = inner
            .records
            .iter()
            .filter(|r| filter.kind.map_or(true, |k| k == r.kind))
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.finished_at));
        if let Some(limit) = filter.scan_limit {
            records.truncate(limit as usize);
        }
        records.retain(|r| filter.matches(r));
        Ok(records)
    }

    async fn delete_match_record(&self, id: i32) -> Result<(), StoreError> {
        self.inner.lock().unwrap().records.retain(|r| r.id != id);
        Ok(())
    }

    async fn purge_unlogged_matches(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.records.len();
        inner.records.retain(|r| r.log.is_some());
        Ok((before - inner.records.len()) as u64)
    }

    async fn upsert_player(&self, player: Player) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .players
            .insert(player.user_id, player);
        Ok(())
    }

    async fn get_player(&self, user: UserId) -> Result<Option<Player>, StoreError> {
        Ok(self.inner.lock().unwrap().players.get(&user).cloned())
    }
}
