use serenity::all::GuildId;
use thiserror::Error;

use crate::helpers::parse_snowflake;

const DEFAULT_SETTINGS_PATH: &str = "config.json";
const DEFAULT_DATABASE_URL: &str = "sqlite://queue.db?mode=rwc";

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is not set.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Environment variable {name} is not a valid id: {value:?}")]
    InvalidId { name: String, value: String },
}

/// Process configuration read from the environment.
#[derive(Debug)]
pub struct BotConfig {
    pub discord_token: String,
    pub guild_id: GuildId,
    pub settings_path: String,
    pub database_url: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required =
            |name: &str| lookup(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()));
        let raw_guild = required("GUILD_ID")?;
        let guild_id = parse_snowflake(&raw_guild).ok_or_else(|| ConfigError::InvalidId {
            name: "GUILD_ID".to_string(),
            value: raw_guild.clone(),
        })?;
        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            guild_id,
            settings_path: lookup("SETTINGS_PATH").unwrap_or_else(|| DEFAULT_SETTINGS_PATH.into()),
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = BotConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "token"),
            ("GUILD_ID", "1431577673938767932"),
        ]))
        .unwrap();
        assert_eq!(config.guild_id, GuildId::new(1431577673938767932));
        assert_eq!(config.settings_path, "config.json");
        assert_eq!(config.database_url, "sqlite://queue.db?mode=rwc");
    }

    #[test]
    fn missing_token_is_reported() {
        let err = BotConfig::from_lookup(lookup(&[("GUILD_ID", "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "DISCORD_TOKEN"));
    }

    #[test]
    fn bad_guild_id_is_reported() {
        let err = BotConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "token"),
            ("GUILD_ID", "lobby"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidId { .. }));
    }
}
