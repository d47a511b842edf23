// src/config.rs
use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub public_base_url: String,
    pub cors_origin: Option<String>,
    pub feed_capacity: usize,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let store = try_load("STORE", "postgres")?;
        let database_url = env::var("DATABASE_URL").ok();

        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            port: try_load("PORT", "3030")?,
            store,
            database_url,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            public_base_url: try_load::<String>("PUBLIC_BASE_URL", "http://localhost:3030")?
                .trim_end_matches('/')
                .to_string(),
            cors_origin: env::var("CORS_ORIGIN").ok(),
            feed_capacity: try_load("FEED_CAPACITY", "1024")?,
        })
    }

    /// Defaults for an in-memory instance without reading the environment.
    pub fn in_memory(public_base_url: &str) -> Self {
        Self {
            port: 0,
            store: StoreKind::Memory,
            database_url: None,
            max_connections: 1,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            cors_origin: None,
            feed_capacity: 1024,
        }
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}
