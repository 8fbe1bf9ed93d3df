use std::env;
use std::str::FromStr;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Dataset holding the reviews collection.
    pub dataset_id: Uuid,
    /// `doc_type` of review documents.
    pub doc_type: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// Default filter when `RUST_LOG` is unset, e.g. "info" or "debug".
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn parse_var<T>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = get("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let dataset_id = get("DATASET_ID").ok_or(ConfigError::Missing("DATASET_ID"))?;
        let dataset_id = Uuid::parse_str(dataset_id.trim()).map_err(|e| ConfigError::Invalid {
            name: "DATASET_ID",
            reason: e.to_string(),
        })?;

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected \"json\" or \"pretty\", got {other:?}"),
                })
            }
        };

        let config = Self {
            database_url,
            dataset_id,
            doc_type: get("REVIEW_DOC_TYPE").unwrap_or_else(|| "review".to_string()),
            db_max_connections: parse_var(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 5)?,
            db_min_connections: parse_var(get("DB_MIN_CONNECTIONS"), "DB_MIN_CONNECTIONS", 1)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
        };
        if config.db_min_connections > config.db_max_connections {
            return Err(ConfigError::Invalid {
                name: "DB_MIN_CONNECTIONS",
                reason: "exceeds DB_MAX_CONNECTIONS".to_string(),
            });
        }
        Ok(config)
    }
}
