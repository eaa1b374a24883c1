//! Runtime settings consumed by the core.
//!
//! These are plain values with production defaults. The server builds
//! them from its TOML file; tests build them directly.

use std::time::Duration;

/// Directional query bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    /// Hard ceiling on `count` for directional queries.
    pub direction_count_limit: usize,
    /// Requested page size for each listing call.
    pub list_page_size: usize,
    /// Safety ceiling on keys accumulated by a single forward scan.
    pub max_list_items: usize,
    /// How far back a previous-direction scan looks.
    pub previous_lookback_days: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            direction_count_limit: 10_000,
            list_page_size: 1_000,
            max_list_items: 1_000_000,
            previous_lookback_days: 366,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    /// Skew subtracted from now to obtain stable time.
    pub stable_skew: Duration,
    /// Staleness bound of the process-local channel config cache.
    pub channel_cache_ttl: Duration,
    /// Public base URL of this hub, with a trailing `/`.
    pub app_url: String,
    pub query: QuerySettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            stable_skew: Duration::from_secs(5),
            channel_cache_ttl: Duration::from_secs(60),
            app_url: default_app_url(),
            query: QuerySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    /// Sleep between polls that found nothing new.
    pub poll_interval: Duration,
    /// Periodic reconcile against the persisted webhook set.
    pub reconcile_interval: Duration,
    /// Exponent cap for delivery retry backoff (`2^n` seconds).
    pub max_retry_exponent: u32,
    /// Per-request timeout for callbacks.
    pub request_timeout: Duration,
    /// Keys requested from the channel per poll.
    pub keys_per_poll: usize,
    pub election: ElectionSettings,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(60),
            max_retry_exponent: 11,
            request_timeout: Duration::from_secs(30),
            keys_per_poll: 1_000,
            election: ElectionSettings::default(),
        }
    }
}

/// Pacing of a leader election candidacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionSettings {
    /// Pause before re-entering candidacy after a worker returns normally.
    pub requeue_delay: Duration,
    /// Pause before re-entering candidacy after a worker failed.
    pub error_backoff: Duration,
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self {
            requeue_delay: Duration::from_millis(100),
            error_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationSettings {
    pub app_name: String,
    pub environment: String,
    /// Public base URL of this hub, with a trailing `/`.
    pub app_url: String,
    pub reconcile_interval: Duration,
    pub election: ElectionSettings,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            app_name: "hub".to_owned(),
            environment: "local".to_owned(),
            app_url: default_app_url(),
            reconcile_interval: Duration::from_secs(60),
            election: ElectionSettings::default(),
        }
    }
}

fn default_app_url() -> String {
    "http://localhost:8080/".to_owned()
}
