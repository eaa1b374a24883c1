//! TOML file configuration structures.
//!
//! These structs directly map to the `hub-config.toml` file format. Every
//! section is optional; a missing section takes the production defaults.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub time: TimeConfig,
    pub query: QueryConfig,
    pub channels: ChannelsConfig,
    pub webhooks: WebhooksConfig,
    pub replication: ReplicationConfig,
    pub storage: StorageConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Identity of this hub within its environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub environment: String,
    /// Public base URL other hubs and clients reach this one at.
    pub url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "hub".to_string(),
            environment: "local".to_string(),
            url: "http://localhost:8080/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// How far stable time trails the wall clock.
    pub stable_seconds: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { stable_seconds: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub direction_count_limit: usize,
    pub list_page_size: usize,
    pub max_list_items: usize,
    pub previous_lookback_days: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            direction_count_limit: 10_000,
            list_page_size: 1_000,
            max_list_items: 1_000_000,
            previous_lookback_days: 366,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub cache_ttl_seconds: u64,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    pub poll_interval_ms: u64,
    pub reconcile_interval_seconds: u64,
    /// Retry backoff is `2^n` seconds with `n` capped here.
    pub max_retry_exponent: u32,
    pub request_timeout_seconds: u64,
    pub keys_per_poll: usize,
    pub requeue_delay_ms: u64,
    pub error_backoff_ms: u64,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            reconcile_interval_seconds: 60,
            max_retry_exponent: 11,
            request_timeout_seconds: 30,
            keys_per_poll: 1_000,
            requeue_delay_ms: 100,
            error_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub reconcile_interval_seconds: u64,
    /// Timeout for calls to upstream hubs.
    pub request_timeout_seconds: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_seconds: 60,
            request_timeout_seconds: 30,
        }
    }
}

/// Where content, configs and cursors are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Everything in process memory; lost on restart.
    #[default]
    Memory,
    /// PostgreSQL at `DATABASE_URL`.
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Largest page a single listing call returns.
    pub max_page_size: usize,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            max_page_size: 1_000,
            max_connections: 10,
        }
    }
}
