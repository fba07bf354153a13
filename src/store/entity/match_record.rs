use sea_orm::entity::prelude::*;

/// A finished match. `player_ids` holds a JSON array of user ids.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "matches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub kind: String,
    pub player_ids: String,
    pub result: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub log_channel_id: Option<String>,
    pub log_message_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
