use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Global Config stored in `OnceLock`
static CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Postgres connection string. When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub log_dir: PathBuf,
    pub log_level: tracing::Level,
    pub role_cache_ttl: Duration,
}

impl Config {
    /// Load environment variables and apply defaults
    pub fn try_from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            bind_addr: parse_var("BIND_ADDR", "127.0.0.1:3000")?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "10")?,
            log_dir: PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string())),
            log_level: parse_var("LOG_LEVEL", "info")?,
            role_cache_ttl: Duration::from_secs(parse_var("ROLE_CACHE_TTL_SECS", "600")?),
        })
    }

    /// Initialize the global config
    pub fn init() -> Result<Arc<Config>, ConfigError> {
        let config = Arc::new(Self::try_from_env()?);
        Ok(CONFIG.get_or_init(|| config).clone())
    }

    /// The global config, once `init` has run
    pub fn get() -> Option<Arc<Config>> {
        CONFIG.get().cloned()
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
