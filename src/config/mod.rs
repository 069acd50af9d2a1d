//! Application configuration loaded from environment.

use std::net::SocketAddr;
use std::time::Duration;

/// Which implementation backs the broker and the unread counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerBackend {
    /// Redis pub/sub and Redis keys.
    Redis,
    /// In-process broadcast channels; single node only.
    Memory,
}

/// Application configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g. `0.0.0.0:3000`).
    pub server_addr: SocketAddr,
    pub broker_backend: BrokerBackend,
    /// Pub/sub broker URL. Defaults to `redis_url`.
    pub broker_url: String,
    /// Key-value store URL used for unread counters (e.g. `redis://127.0.0.1/`).
    pub redis_url: String,
    /// Key that backend processes send as `x-app-key` when publishing.
    pub app_key: String,
    /// JWT signing secret (min 32 chars).
    pub jwt_secret: String,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
    /// Interval between keep-alive comments on the notification stream.
    pub keep_alive: Duration,
    /// Mirror room emissions through the broker so other processes deliver them too.
    pub cluster_fanout: bool,
    pub node_id: String,
    /// Base URL the order socket client dials (e.g. `ws://127.0.0.1:3000`).
    pub order_socket_url: String,
}

impl Config {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server_addr: SocketAddr = var("SERVER_ADDR", "0.0.0.0:3000")
            .parse()
            .map_err(|_| ConfigLoadError::InvalidServerAddr)?;

        let broker_backend = match var("BROKER_BACKEND", "redis").to_lowercase().as_str() {
            "redis" => BrokerBackend::Redis,
            "memory" => BrokerBackend::Memory,
            other => return Err(ConfigLoadError::InvalidBrokerBackend(other.to_string())),
        };

        let redis_url = var("REDIS_URL", "redis://127.0.0.1/");
        let broker_url = lookup("BROKER_URL").unwrap_or_else(|| redis_url.clone());
        let app_key = var("APP_KEY", "orderwire_key");
        let jwt_secret = var(
            "JWT_SECRET",
            "orderwire_jwt_secret_change_in_production_32chars",
        );
        let log_level = var("LOG_LEVEL", "info");

        let keep_alive_secs: u64 = var("KEEP_ALIVE_SECS", "30")
            .parse()
            .map_err(|_| ConfigLoadError::InvalidKeepAlive)?;
        if keep_alive_secs == 0 {
            return Err(ConfigLoadError::InvalidKeepAlive);
        }

        let cluster_fanout = matches!(
            var("CLUSTER_FANOUT", "false").to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
        let node_id = lookup("NODE_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let order_socket_url = var("ORDER_SOCKET_URL", "ws://127.0.0.1:3000");

        Ok(Self {
            server_addr,
            broker_backend,
            broker_url,
            redis_url,
            app_key,
            jwt_secret,
            log_level,
            keep_alive: Duration::from_secs(keep_alive_secs),
            cluster_fanout,
            node_id,
            order_socket_url,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Invalid SERVER_ADDR")]
    InvalidServerAddr,
    #[error("Invalid BROKER_BACKEND: {0} (expected `redis` or `memory`)")]
    InvalidBrokerBackend(String),
    #[error("Invalid KEEP_ALIVE_SECS")]
    InvalidKeepAlive,
}
