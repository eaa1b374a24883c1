//! Configuration module for hub-server.
//!
//! Handles loading configuration from the TOML file and CLI overrides,
//! and turns it into the validated settings `hub-core` consumes.

pub mod file;

use crate::config::file::{FileConfig, StorageBackend};
use hub_core::config::{
    ElectionSettings, HubSettings, QuerySettings, ReplicationSettings, WebhookSettings,
};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub backend: StorageBackend,
    pub max_page_size: usize,
    pub max_connections: u32,
    pub hub: HubSettings,
    pub webhooks: WebhookSettings,
    pub replication: ReplicationSettings,
    pub upstream_timeout: Duration,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let file_config: FileConfig = toml::from_str(&config_content)?;
        self.build(file_config)
    }

    fn build(&self, mut file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.app.url)
        .map_err(|e| ConfigError::ValidationError(format!("app.url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::ValidationError(
            "app.url must be an http(s) URL".to_string(),
        ));
    }
    if config.app.name.is_empty() || config.app.environment.is_empty() {
        return Err(ConfigError::ValidationError(
            "app.name and app.environment must not be empty".to_string(),
        ));
    }
    let positive = [
        ("query.direction_count_limit", config.query.direction_count_limit),
        ("query.list_page_size", config.query.list_page_size),
        ("query.max_list_items", config.query.max_list_items),
        ("webhooks.keys_per_poll", config.webhooks.keys_per_poll),
        ("storage.max_page_size", config.storage.max_page_size),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{field} must be greater than zero"
            )));
        }
    }
    if config.webhooks.max_retry_exponent > 30 {
        return Err(ConfigError::ValidationError(
            "webhooks.max_retry_exponent must be at most 30".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let FileConfig {
        server,
        app,
        time,
        query,
        channels,
        webhooks,
        replication,
        storage,
    } = file_config;
    let app_url = with_trailing_slash(app.url);

    let hub = HubSettings {
        stable_skew: Duration::from_secs(time.stable_seconds),
        channel_cache_ttl: Duration::from_secs(channels.cache_ttl_seconds),
        app_url: app_url.clone(),
        query: QuerySettings {
            direction_count_limit: query.direction_count_limit,
            list_page_size: query.list_page_size,
            max_list_items: query.max_list_items,
            previous_lookback_days: query.previous_lookback_days,
        },
    };
    let election = ElectionSettings {
        requeue_delay: Duration::from_millis(webhooks.requeue_delay_ms),
        error_backoff: Duration::from_millis(webhooks.error_backoff_ms),
    };

    LoadedConfig {
        listen: server.listen,
        backend: storage.backend,
        max_page_size: storage.max_page_size,
        max_connections: storage.max_connections,
        hub,
        webhooks: WebhookSettings {
            poll_interval: Duration::from_millis(webhooks.poll_interval_ms),
            reconcile_interval: Duration::from_secs(webhooks.reconcile_interval_seconds),
            max_retry_exponent: webhooks.max_retry_exponent,
            request_timeout: Duration::from_secs(webhooks.request_timeout_seconds),
            keys_per_poll: webhooks.keys_per_poll,
            election,
        },
        replication: ReplicationSettings {
            app_name: app.name,
            environment: app.environment,
            app_url,
            reconcile_interval: Duration::from_secs(replication.reconcile_interval_seconds),
            election,
        },
        upstream_timeout: Duration::from_secs(replication.request_timeout_seconds),
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(toml_str: &str, listen: Option<SocketAddr>) -> Result<LoadedConfig, ConfigError> {
        let loader = ConfigLoader::new("unused.toml", listen);
        loader.build(toml::from_str(toml_str).unwrap())
    }

    #[test]
    fn test_settings_are_built_from_file() {
        let loaded = load(
            r#"
[app]
name = "hub-v2"
environment = "prod"
url = "https://hub.example.com"

[webhooks]
poll_interval_ms = 250
error_backoff_ms = 1000
"#,
            None,
        )
        .unwrap();
        assert_eq!(loaded.hub.app_url, "https://hub.example.com/");
        assert_eq!(loaded.replication.app_url, "https://hub.example.com/");
        assert_eq!(loaded.replication.app_name, "hub-v2");
        assert_eq!(loaded.webhooks.poll_interval, Duration::from_millis(250));
        assert_eq!(loaded.webhooks.election.error_backoff, Duration::from_secs(1));
        assert_eq!(loaded.replication.election, loaded.webhooks.election);
        assert_eq!(loaded.hub.stable_skew, Duration::from_secs(5));
    }

    #[test]
    fn test_listen_override_wins() {
        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = load("[server]\nlisten = \"0.0.0.0:1\"\n", Some(listen)).unwrap();
        assert_eq!(loaded.listen, listen);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = load("[app]\nurl = \"ftp://hub\"\n", None).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        let err = load("[query]\nlist_page_size = 0\n", None).unwrap_err();
        assert!(err.to_string().contains("query.list_page_size"));
        let err = load("[webhooks]\nmax_retry_exponent = 64\n", None).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
