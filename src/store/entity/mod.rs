//! sea-orm entity definitions for the bot's SQLite tables.

pub mod match_record;
pub mod player;
pub mod queue_entry;
