//! Process-local channel config cache with bounded staleness.

use super::config_dao::ChannelConfigDao;
use crate::error::HubError;
use crate::model::{ChannelConfig, channel_key};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    loaded_at: Instant,
    config: Option<ChannelConfig>,
}

/// Read-through cache in front of a [`ChannelConfigDao`].
///
/// Entries, including "no such channel", are served for up to `ttl`.
/// A zero `ttl` reads through on every call.
pub struct ChannelConfigCache {
    dao: Arc<dyn ChannelConfigDao>,
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ChannelConfigCache {
    pub fn new(dao: Arc<dyn ChannelConfigDao>, ttl: Duration) -> Self {
        Self {
            dao,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn dao(&self) -> &Arc<dyn ChannelConfigDao> {
        &self.dao
    }

    pub async fn get(&self, name: &str) -> Result<Option<ChannelConfig>, HubError> {
        let key = channel_key(name);
        if !self.ttl.is_zero() {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(entry.config.clone());
                }
            }
        }

        let config = self.dao.get(&key).await?;
        if !self.ttl.is_zero() {
            self.entries.write().await.insert(
                key,
                Entry {
                    loaded_at: Instant::now(),
                    config: config.clone(),
                },
            );
        }
        Ok(config)
    }

    /// Drop the cached entry so this process sees its own writes at once.
    pub async fn invalidate(&self, name: &str) {
        self.entries.write().await.remove(&channel_key(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::config_dao::CoordinatorChannelConfigDao;
    use crate::cluster::InMemoryCoordinator;
    use time::macros::datetime;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let dao = Arc::new(CoordinatorChannelConfigDao::new(Arc::new(
            InMemoryCoordinator::new().session(),
        )));
        let cache = ChannelConfigCache::new(dao.clone(), Duration::from_secs(60));
        assert_eq!(cache.get("a").await.unwrap(), None);

        let config = ChannelConfig::new("a", datetime!(2024-01-01 00:00 UTC));
        dao.upsert(&config).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("A").await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_zero_ttl_reads_through() {
        let dao = Arc::new(CoordinatorChannelConfigDao::new(Arc::new(
            InMemoryCoordinator::new().session(),
        )));
        let cache = ChannelConfigCache::new(dao.clone(), Duration::ZERO);
        assert_eq!(cache.get("a").await.unwrap(), None);
        let config = ChannelConfig::new("a", datetime!(2024-01-01 00:00 UTC));
        dao.upsert(&config).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(config));
    }
}
