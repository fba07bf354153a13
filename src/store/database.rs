use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, ConnectionTrait, Database,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Schema,
};
use serenity::all::{ChannelId, MessageId, UserId};
use serenity::async_trait;
use tracing::{info, warn};

use super::entity::{match_record, player, queue_entry};
use super::{MatchFilter, Store, StoreError};
use crate::helpers::parse_snowflake;
use crate::model::{MatchRecord, MessageRef, NewMatchRecord, Player, QueueEntry};

/// SQLite-backed store.
#[derive(Clone)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    /// Connects to `url` and creates any missing tables.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let db = Database::connect(url).await?;
        let store = Self { db };
        store.create_tables().await?;
        info!(url, "connected to database");
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);
        let mut stmts = [
            schema.create_table_from_entity(queue_entry::Entity),
            schema.create_table_from_entity(player::Entity),
            schema.create_table_from_entity(match_record::Entity),
        ];
        for stmt in stmts.iter_mut() {
            stmt.if_not_exists();
            self.db.execute(backend.build(&*stmt)).await?;
        }
        Ok(())
    }
}

fn corrupt(table: &'static str, key: impl ToString, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        table,
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn entry_from_model(m: queue_entry::Model) -> Result<QueueEntry, StoreError> {
    let user_id = parse_snowflake(&m.user_id)
        .ok_or_else(|| corrupt("queue", &m.user_id, "bad user id"))?;
    Ok(QueueEntry {
        user_id,
        joined_at: m.joined_at,
    })
}

fn record_from_model(m: match_record::Model) -> Result<MatchRecord, StoreError> {
    let kind = m.kind.parse().map_err(|e| corrupt("matches", m.id, e))?;
    let result = m.result.parse().map_err(|e| corrupt("matches", m.id, e))?;
    let raw_ids: Vec<String> =
        serde_json::from_str(&m.player_ids).map_err(|e| corrupt("matches", m.id, e))?;
    let player_ids = raw_ids
        .iter()
        .map(|s| {
            parse_snowflake(s).ok_or_else(|| corrupt("matches", m.id, format!("bad user id {s}")))
        })
        .collect::<Result<Vec<UserId>, _>>()?;
    let log = match (
        m.log_channel_id.as_deref().and_then(parse_snowflake::<ChannelId>),
        m.log_message_id.as_deref().and_then(parse_snowflake::<MessageId>),
    ) {
        (Some(channel_id), Some(message_id)) => Some(MessageRef {
            channel_id,
            message_id,
        }),
        _ => None,
    };
    Ok(MatchRecord {
        id: m.id,
        kind,
        player_ids,
        result,
        started_at: m.started_at,
        finished_at: m.finished_at,
        log,
    })
}

#[async_trait]
impl Store for DbStore {
    async fn upsert_queue_entry(&self, user: UserId, joined_at: i64) -> Result<(), StoreError> {
        let entry = queue_entry::ActiveModel {
            user_id: ActiveValue::Set(user.to_string()),
            joined_at: ActiveValue::Set(joined_at),
        };
        queue_entry::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(queue_entry::Column::UserId)
                    .update_column(queue_entry::Column::JoinedAt)
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn delete_queue_entry(&self, user: UserId) -> Result<(), StoreError> {
        queue_entry::Entity::delete_by_id(user.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_queue_entries(&self) -> Result<Vec<QueueEntry>, StoreError> {
        queue_entry::Entity::find()
            .order_by_asc(queue_entry::Column::JoinedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(entry_from_model)
            .collect()
    }

    async fn clear_queue(&self) -> Result<(), StoreError> {
        queue_entry::Entity::delete_many().exec(&self.db).await?;
        Ok(())
    }

    async fn append_match_record(
        &self,
        record: NewMatchRecord,
    ) -> Result<MatchRecord, StoreError> {
        let player_ids: Vec<String> = record.player_ids.iter().map(|u| u.to_string()).collect();
        let player_ids = serde_json::to_string(&player_ids)
            .map_err(|e| corrupt("matches", "new", e))?;
        let model = match_record::ActiveModel {
            id: ActiveValue::NotSet,
            kind: ActiveValue::Set(record.kind.as_str().to_owned()),
            player_ids: ActiveValue::Set(player_ids),
            result: ActiveValue::Set(record.result.as_str().to_owned()),
            started_at: ActiveValue::Set(record.started_at),
            finished_at: ActiveValue::Set(record.finished_at),
            log_channel_id: ActiveValue::Set(record.log.map(|l| l.channel_id.to_string())),
            log_message_id: ActiveValue::Set(record.log.map(|l| l.message_id.to_string())),
        }
        .insert(&self.db)
        .await?;
        record_from_model(model)
    }

    async fn query_match_records(
        &self,
        filter: MatchFilter,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        let mut query =
            match_record::Entity::find().order_by_desc(match_record::Column::FinishedAt);
        if let Some(kind) = filter.kind {
            query = query.filter(match_record::Column::Kind.eq(kind.as_str()));
        }
        if let Some(limit) = filter.scan_limit {
            query = query.limit(limit);
        }

        let mut records = Vec::new();
        for model in query.all(&self.db).await? {
            match record_from_model(model) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable match record: {}", e),
            }
        }
        Ok(records)
    }

    async fn delete_match_record(&self, id: i32) -> Result<(), StoreError> {
        match_record::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    async fn purge_unlogged_matches(&self) -> Result<u64, StoreError> {
        let res = match_record::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(match_record::Column::LogMessageId.is_null())
                    .add(match_record::Column::LogMessageId.eq("")),
            )
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    async fn upsert_player(&self, p: Player) -> Result<(), StoreError> {
        let model = player::ActiveModel {
            user_id: ActiveValue::Set(p.user_id.to_string()),
            game_id: ActiveValue::Set(p.game_id),
            nickname: ActiveValue::Set(p.nickname),
        };
        player::Entity::insert(model)
            .on_conflict(
                OnConflict::column(player::Column::UserId)
                    .update_columns([player::Column::GameId, player::Column::Nickname])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn get_player(&self, user: UserId) -> Result<Option<Player>, StoreError> {
        let Some(model) = player::Entity::find_by_id(user.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(Player {
            user_id: user,
            game_id: model.game_id,
            nickname: model.nickname,
        }))
    }
}
