use std::time::Duration;

use serde::Deserialize;

use crate::models::token::MAX_LIFESPAN_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    /// Process-local store; tokens are lost on restart. Dev and tests only.
    Memory,
}

impl StoreBackend {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("unknown IAM_STORE backend '{}': expected 'postgres' or 'memory'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub store: StoreBackend,
    /// Lifespan applied when a create request omits `expiresIn`.
    /// Set via IAM_TOKEN_DEFAULT_LIFESPAN (seconds). Default: 10800.
    pub default_token_lifespan_secs: u64,
    /// Upper bound on every token store call.
    /// Set via IAM_STORE_TIMEOUT_MS. Default: 5000.
    pub store_timeout_ms: u64,
    /// Expired tokens older than this are purged by the cleanup job.
    pub token_retention_secs: u64,
    pub cleanup_interval_secs: u64,
    /// `json` switches the log formatter to JSON lines.
    pub log_format: String,
}

impl Config {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Capped at [`MAX_LIFESPAN_SECS`] so the purge cutoff stays representable.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_retention_secs.min(MAX_LIFESPAN_SECS) as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "postgres://localhost/iam".into(),
            store: StoreBackend::Postgres,
            default_token_lifespan_secs: 3 * 3600,
            store_timeout_ms: 5000,
            token_retention_secs: 86400,
            cleanup_interval_secs: 3600,
            log_format: "text".into(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    let store = match std::env::var("IAM_STORE") {
        Ok(v) => StoreBackend::parse(&v)?,
        Err(_) => defaults.store,
    };

    let default_token_lifespan_secs =
        env_or("IAM_TOKEN_DEFAULT_LIFESPAN", defaults.default_token_lifespan_secs);
    if default_token_lifespan_secs == 0 || default_token_lifespan_secs > MAX_LIFESPAN_SECS {
        anyhow::bail!(
            "IAM_TOKEN_DEFAULT_LIFESPAN must be between 1 and {} seconds",
            MAX_LIFESPAN_SECS
        );
    }

    Ok(Config {
        port: env_or("IAM_PORT", defaults.port),
        database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        store,
        default_token_lifespan_secs,
        store_timeout_ms: env_or("IAM_STORE_TIMEOUT_MS", defaults.store_timeout_ms),
        token_retention_secs: env_or("IAM_TOKEN_RETENTION_SECS", defaults.token_retention_secs),
        cleanup_interval_secs: env_or("IAM_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval_secs),
        log_format: std::env::var("IAM_LOG_FORMAT").unwrap_or(defaults.log_format),
    })
}
