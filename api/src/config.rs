use crate::backend::PreviewOptions;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Where the gateway keeps things on the backend, and how it treats files.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub users_collection: String,
    pub posts_collection: String,
    pub saves_collection: String,
    pub media_bucket: String,
    pub preview: PreviewOptions,
    /// Also delete the stored image when a post is deleted.
    pub purge_files_on_delete: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            users_collection: "users".to_string(),
            posts_collection: "posts".to_string(),
            saves_collection: "saves".to_string(),
            media_bucket: "media".to_string(),
            preview: PreviewOptions::default(),
            purge_files_on_delete: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub requests_per_second: u32,
    pub max_concurrent_requests: usize,
    pub gateway: GatewayConfig,
}

impl Config {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let defaults = GatewayConfig::default();
        let gateway = GatewayConfig {
            users_collection: lookup("USER_COLLECTION_ID").unwrap_or(defaults.users_collection),
            posts_collection: lookup("POST_COLLECTION_ID").unwrap_or(defaults.posts_collection),
            saves_collection: lookup("SAVES_COLLECTION_ID").unwrap_or(defaults.saves_collection),
            media_bucket: lookup("STORAGE_ID").unwrap_or(defaults.media_bucket),
            preview: defaults.preview,
            purge_files_on_delete: parse_or(&lookup, "PURGE_FILES_ON_DELETE", false)?,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            jwt_secret,
            session_ttl_hours: parse_or(&lookup, "SESSION_TTL_HOURS", 24)?,
            requests_per_second: parse_or(&lookup, "RATE_LIMIT_PER_SECOND", 50)?,
            max_concurrent_requests: parse_or(&lookup, "MAX_CONCURRENT_REQUESTS", 256)?,
            gateway,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
