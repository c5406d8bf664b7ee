//! Environment-driven server configuration.

use std::net::SocketAddr;

use taskrelay_core::LifecyclePolicy;
use taskrelay_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Which job/agent store backs the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Sqlite { url: String, max_connections: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageConfig,
    pub lifecycle: LifecyclePolicy,
    pub log_format: LogFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage: StorageConfig::InMemory,
            lifecycle: LifecyclePolicy::default(),
            log_format: LogFormat::Json,
        }
    }
}

impl ApiConfig {
    /// Load from the process environment, after applying an optional `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_addr = get("TASKRELAY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("TASKRELAY_BIND_ADDR", &raw_addr, e))?;

        let max_connections = match get("TASKRELAY_DB_MAX_CONNECTIONS") {
            None => DEFAULT_DB_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                Ok(_) => {
                    return Err(ConfigError::invalid(
                        "TASKRELAY_DB_MAX_CONNECTIONS",
                        &raw,
                        "must be at least 1",
                    ));
                }
                Err(e) => return Err(ConfigError::invalid("TASKRELAY_DB_MAX_CONNECTIONS", &raw, e)),
            },
        };

        let storage = match (get("DATABASE_URL"), get("TASKRELAY_SQLITE_PATH")) {
            (Some(url), _) => StorageConfig::Sqlite {
                url: url.trim().to_string(),
                max_connections,
            },
            (None, Some(path)) => StorageConfig::Sqlite {
                url: format!("sqlite://{}?mode=rwc", path.trim()),
                max_connections,
            },
            (None, None) => StorageConfig::InMemory,
        };

        let allow_terminal_overwrite = match get("TASKRELAY_ALLOW_TERMINAL_OVERWRITE") {
            None => true,
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid("TASKRELAY_ALLOW_TERMINAL_OVERWRITE", &raw, "expected true or false"))?,
        };

        let log_format = match get("TASKRELAY_LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid("TASKRELAY_LOG_FORMAT", &raw, e))?,
        };

        Ok(Self {
            bind_addr,
            storage,
            lifecycle: LifecyclePolicy {
                allow_terminal_overwrite,
            },
            log_format,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
