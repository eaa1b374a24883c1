//! Channel operations: configuration lifecycle, content writes and reads,
//! and TTL-aware key queries.

use super::cache::ChannelConfigCache;
use super::validator::validate_channel;
use crate::clock::TimeSource;
use crate::error::HubError;
use crate::model::{ChannelConfig, ContentKey, DirectionQuery, TimeQuery, channel_key};
use crate::notify::Watchers;
use crate::storage::{Content, ContentQueries, get_with_retry};
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

/// Reads of items older than the TTL boundary minus this grace are refused.
const READ_GRACE: Duration = Duration::minutes(15);

pub struct ChannelService {
    configs: ChannelConfigCache,
    queries: ContentQueries,
    direction_count_limit: usize,
    replication_watchers: Watchers,
}

impl ChannelService {
    pub fn new(
        configs: ChannelConfigCache,
        queries: ContentQueries,
        replication_watchers: Watchers,
    ) -> Self {
        let direction_count_limit = queries.settings().direction_count_limit;
        Self {
            configs,
            queries,
            direction_count_limit,
            replication_watchers,
        }
    }

    pub fn times(&self) -> &TimeSource {
        self.queries.times()
    }

    // -- Configuration ----------------------------------------------------

    pub async fn channel_exists(&self, name: &str) -> Result<bool, HubError> {
        self.configs.dao().exists(name).await
    }

    pub async fn create_channel(&self, config: ChannelConfig) -> Result<ChannelConfig, HubError> {
        validate_channel(&config)?;
        if self.configs.dao().exists(&config.name).await? {
            return Err(HubError::Conflict(format!(
                "channel {} already exists",
                config.name
            )));
        }
        info!(channel = %config.name, "Creating channel");
        self.configs.dao().upsert(&config).await?;
        self.configs.invalidate(&config.name).await;
        self.notify(&config, None);
        Ok(config)
    }

    /// Persist `config` if it differs from `old`. The creation date of an
    /// existing channel is kept.
    pub async fn update_channel(
        &self,
        mut config: ChannelConfig,
        old: Option<&ChannelConfig>,
    ) -> Result<ChannelConfig, HubError> {
        if let Some(old) = old {
            config.creation_date = old.creation_date;
        }
        if !config.has_changed(old) {
            debug!(channel = %config.name, "Channel update with no changes");
            return Ok(config);
        }
        validate_channel(&config)?;
        info!(channel = %config.name, "Updating channel");
        self.configs.dao().upsert(&config).await?;
        self.configs.invalidate(&config.name).await;
        self.notify(&config, old);
        Ok(config)
    }

    /// Create `config`, or update the existing channel of the same name.
    pub async fn upsert_channel(&self, config: ChannelConfig) -> Result<ChannelConfig, HubError> {
        match self.configs.dao().get(&config.name).await? {
            Some(old) => self.update_channel(config, Some(&old)).await,
            None => self.create_channel(config).await,
        }
    }

    fn notify(&self, new: &ChannelConfig, old: Option<&ChannelConfig>) {
        let relevant = new.is_replication_relevant()
            || old.is_some_and(ChannelConfig::is_replication_relevant);
        if relevant {
            debug!(channel = %new.name, "Notifying replication watchers");
            self.replication_watchers.notify();
        }
    }

    pub async fn get_channel_config(
        &self,
        name: &str,
        allow_cache: bool,
    ) -> Result<Option<ChannelConfig>, HubError> {
        if allow_cache {
            self.configs.get(name).await
        } else {
            self.configs.dao().get(name).await
        }
    }

    async fn cached_config(&self, name: &str) -> Result<ChannelConfig, HubError> {
        self.configs
            .get(name)
            .await?
            .ok_or_else(|| HubError::not_found(format!("channel {name}")))
    }

    pub async fn get_channels(&self) -> Result<Vec<ChannelConfig>, HubError> {
        self.configs.dao().get_all().await
    }

    pub async fn get_channels_by_tag(&self, tag: &str) -> Result<Vec<ChannelConfig>, HubError> {
        let mut channels = self.get_channels().await?;
        channels.retain(|c| c.tags.iter().any(|t| t == tag));
        Ok(channels)
    }

    pub async fn get_tags(&self) -> Result<BTreeSet<String>, HubError> {
        Ok(self
            .get_channels()
            .await?
            .into_iter()
            .flat_map(|c| c.tags)
            .collect())
    }

    /// Unknown channels are not replicating.
    pub async fn is_replicating(&self, name: &str) -> Result<bool, HubError> {
        Ok(self
            .configs
            .get(name)
            .await?
            .is_some_and(|c| c.is_replicating()))
    }

    /// Delete a channel's content and config. Returns `false` for an
    /// unknown channel.
    pub async fn delete(&self, name: &str) -> Result<bool, HubError> {
        let Some(config) = self.configs.dao().get(name).await? else {
            return Ok(false);
        };
        let limit = ContentKey::last_key(self.times().latest_limit(false));
        let removed = self
            .queries
            .store()
            .delete_range(&channel_key(name), &limit)
            .await?;
        self.configs.dao().delete(name).await?;
        self.configs.invalidate(name).await;
        info!(channel = %name, removed, "Deleted channel");
        if config.is_replicating() {
            self.replication_watchers.notify();
        }
        Ok(true)
    }

    // -- Content ----------------------------------------------------------

    /// Store a new item under a fresh key.
    pub async fn insert(&self, channel: &str, content: Content) -> Result<ContentKey, HubError> {
        let config = self.cached_config(channel).await?;
        if config.is_replicating() {
            return Err(HubError::Forbidden(format!(
                "{channel} cannot be modified while replicating"
            )));
        }
        let key = ContentKey::generate(self.times().now());
        let key = self
            .queries
            .store()
            .put(&channel_key(channel), &key, content)
            .await?;
        debug!(%channel, %key, "Inserted item");
        Ok(key)
    }

    /// Store an item under a key chosen elsewhere, as replication does.
    pub async fn historical_insert(
        &self,
        channel: &str,
        key: &ContentKey,
        content: Content,
    ) -> Result<ContentKey, HubError> {
        self.cached_config(channel).await?;
        let key = self
            .queries
            .store()
            .put(&channel_key(channel), key, content)
            .await?;
        debug!(%channel, %key, "Inserted historical item");
        Ok(key)
    }

    /// An item, unless it is older than the retention boundary.
    pub async fn get(&self, channel: &str, key: &ContentKey) -> Result<Option<Content>, HubError> {
        let config = self.cached_config(channel).await?;
        let cutoff = self.times().earliest_time(config.ttl_days) - READ_GRACE;
        if key.time() < cutoff {
            return Ok(None);
        }
        Ok(get_with_retry(self.queries.store().as_ref(), &channel_key(channel), key).await?)
    }

    pub async fn delete_before(&self, channel: &str, key: &ContentKey) -> Result<u64, HubError> {
        Ok(self
            .queries
            .store()
            .delete_range(&channel_key(channel), key)
            .await?)
    }

    // -- Queries ----------------------------------------------------------

    pub async fn get_latest(
        &self,
        channel: &str,
        stable: bool,
    ) -> Result<Option<ContentKey>, HubError> {
        let config = self.cached_config(channel).await?;
        let start = if stable {
            ContentKey::first_key(self.times().stable())
        } else {
            ContentKey::last_key(self.times().latest_limit(false))
        };
        let query = DirectionQuery::previous(channel_key(channel), start, 1)
            .with_stable(stable)
            .with_ttl_days(config.ttl_days);
        let latest = self.queries.query_previous(&query).await?.pop_last();
        let ttl_time = self.times().earliest_time(config.ttl_days);
        Ok(latest.filter(|key| key.time() > ttl_time))
    }

    /// Keys strictly after or before the query's start key.
    ///
    /// The start key is clamped to the retention boundary before the scan
    /// and the result is filtered against it again afterwards, as retention
    /// may move while the scan runs.
    pub async fn get_keys(&self, query: DirectionQuery) -> Result<BTreeSet<ContentKey>, HubError> {
        if query.count == 0 {
            return Ok(BTreeSet::new());
        }
        let config = self.cached_config(&query.channel_name).await?;
        let mut query = query;
        query.channel_name = channel_key(&query.channel_name);
        if query.count > self.direction_count_limit {
            query = query.with_count(self.direction_count_limit);
        }
        let ttl_time = self.times().earliest_time(config.ttl_days);
        if query.start_key.time() < ttl_time {
            query = query.with_start_key(ContentKey::first_key(ttl_time));
        }
        query = query.with_ttl_days(config.ttl_days);

        let keys = if query.next {
            self.queries.query_next(&query).await?
        } else {
            self.queries.query_previous(&query).await?
        };
        let stable_time = query.stable.then(|| self.times().stable());
        Ok(filter_keys(
            keys,
            &query.start_key,
            self.times().earliest_time(config.ttl_days),
            query.count,
            query.next,
            stable_time,
        ))
    }

    pub async fn query_by_time(&self, query: TimeQuery) -> Result<BTreeSet<ContentKey>, HubError> {
        let config = self.cached_config(&query.channel_name).await?;
        let mut query = query;
        query.channel_name = channel_key(&query.channel_name);
        let keys = self.queries.query_by_time(&query).await?;
        let ttl_time = self.times().earliest_time(config.ttl_days);
        let stable_time = self.times().stable();
        Ok(keys
            .into_iter()
            .filter(|k| k.time() > ttl_time)
            .filter(|k| !query.stable || k.time() < stable_time)
            .collect())
    }

    /// Names of the channels currently configured to replicate, for status.
    pub async fn replicating_channels(&self) -> Result<Vec<ChannelConfig>, HubError> {
        let mut channels = self.get_channels().await?;
        channels.retain(ChannelConfig::is_replicating);
        Ok(channels)
    }
}

/// Final pass over a directional result: strictly on the requested side
/// of `start`, newer than the TTL boundary, older than stable time when
/// given, and at most `count` keys nearest to `start`.
fn filter_keys(
    keys: BTreeSet<ContentKey>,
    start: &ContentKey,
    ttl_time: OffsetDateTime,
    count: usize,
    next: bool,
    stable_time: Option<OffsetDateTime>,
) -> BTreeSet<ContentKey> {
    let kept = keys.into_iter().filter(|k| {
        let side = if next { k > start } else { k < start };
        side && k.time() > ttl_time && stable_time.is_none_or(|s| k.time() < s)
    });
    if next {
        kept.take(count).collect()
    } else {
        let kept: Vec<ContentKey> = kept.collect();
        let skip = kept.len().saturating_sub(count);
        kept.into_iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::config_dao::CoordinatorChannelConfigDao;
    use crate::clock::ManualClock;
    use crate::cluster::InMemoryCoordinator;
    use crate::config::QuerySettings;
    use crate::storage::{ContentStore, InMemoryContentStore};
    use std::sync::Arc;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-06-10 12:00:00 UTC);

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryContentStore>,
        watchers: Watchers,
        service: ChannelService,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let times = TimeSource::new(clock.clone(), Duration::seconds(5));
        let store = Arc::new(InMemoryContentStore::new(3));
        let queries = ContentQueries::new(store.clone(), times, QuerySettings::default());
        let dao = Arc::new(CoordinatorChannelConfigDao::new(Arc::new(
            InMemoryCoordinator::new().session(),
        )));
        let watchers = Watchers::new();
        let service = ChannelService::new(
            ChannelConfigCache::new(dao, std::time::Duration::ZERO),
            queries,
            watchers.clone(),
        );
        Fixture {
            clock,
            store,
            watchers,
            service,
        }
    }

    async fn insert_at(f: &Fixture, channel: &str, at: OffsetDateTime) -> ContentKey {
        f.clock.set(at);
        f.service
            .insert(channel, Content::new(None, "data"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_next_keys_after_start() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("UHF", T0).with_ttl_days(1))
            .await
            .unwrap();
        let k0 = insert_at(&f, "UHF", T0).await;
        let k1 = insert_at(&f, "UHF", T0 + Duration::seconds(1)).await;
        let k2 = insert_at(&f, "UHF", T0 + Duration::seconds(2)).await;
        f.clock.set(T0 + Duration::minutes(1));

        let query = DirectionQuery::next("UHF", k0, 2);
        let keys = f.service.get_keys(query.clone()).await.unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![k1, k2]);

        let again = f.service.get_keys(query).await.unwrap();
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn test_ttl_boundary_is_exclusive() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("ttl", T0).with_ttl_days(1))
            .await
            .unwrap();
        let now = T0 + Duration::days(1);
        let at_cutoff = ContentKey::new(T0, "aaaaaa");
        let after_cutoff = ContentKey::new(T0 + Duration::milliseconds(1), "aaaaaa");
        for key in [&at_cutoff, &after_cutoff] {
            f.service
                .historical_insert("ttl", key, Content::new(None, "x"))
                .await
                .unwrap();
        }
        f.clock.set(now);

        let keys = f
            .service
            .get_keys(DirectionQuery::next(
                "ttl",
                ContentKey::first_key(T0 - Duration::days(3)),
                10,
            ))
            .await
            .unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![after_cutoff.clone()]);

        let previous = f
            .service
            .get_keys(DirectionQuery::previous("ttl", ContentKey::first_key(now), 10))
            .await
            .unwrap();
        assert_eq!(previous.into_iter().collect::<Vec<_>>(), vec![after_cutoff]);
    }

    #[tokio::test]
    async fn test_count_is_clamped_and_zero_is_empty() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("c", T0))
            .await
            .unwrap();
        insert_at(&f, "c", T0).await;
        f.clock.set(T0 + Duration::minutes(1));

        let start = ContentKey::first_key(T0 - Duration::minutes(1));
        let none = f
            .service
            .get_keys(DirectionQuery::next("c", start.clone(), 0))
            .await
            .unwrap();
        assert!(none.is_empty());

        let huge = f
            .service
            .get_keys(DirectionQuery::next("c", start, usize::MAX))
            .await
            .unwrap();
        assert_eq!(huge.len(), 1);
    }

    #[tokio::test]
    async fn test_previous_returns_nearest_keys() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("p", T0))
            .await
            .unwrap();
        let mut keys = Vec::new();
        for i in 0..5 {
            keys.push(insert_at(&f, "p", T0 - Duration::hours(30) + Duration::hours(i * 7)).await);
        }
        f.clock.set(T0 + Duration::minutes(1));

        let found = f
            .service
            .get_keys(DirectionQuery::previous("p", keys[4].clone(), 2))
            .await
            .unwrap();
        assert_eq!(found.into_iter().collect::<Vec<_>>(), keys[2..4].to_vec());
    }

    #[tokio::test]
    async fn test_latest_respects_stable_time() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("l", T0))
            .await
            .unwrap();
        assert_eq!(f.service.get_latest("l", true).await.unwrap(), None);

        let old = insert_at(&f, "l", T0).await;
        let fresh = insert_at(&f, "l", T0 + Duration::seconds(10)).await;
        f.clock.set(T0 + Duration::seconds(12));

        assert_eq!(f.service.get_latest("l", true).await.unwrap(), Some(old));
        assert_eq!(f.service.get_latest("l", false).await.unwrap(), Some(fresh));
        assert!(matches!(
            f.service.get_latest("missing", true).await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_replicating_channel_rejects_inserts() {
        let f = fixture();
        let source = url::Url::parse("http://upstream/channel/r").unwrap();
        f.service
            .create_channel(ChannelConfig::new("r", T0).with_replication_source(source))
            .await
            .unwrap();
        let result = f.service.insert("r", Content::new(None, "x")).await;
        assert!(matches!(result, Err(HubError::Forbidden(_))));
        assert!(f.service.is_replicating("R").await.unwrap());
        assert!(!f.service.is_replicating("unknown").await.unwrap());

        let key = ContentKey::generate(T0);
        f.service
            .historical_insert("r", &key, Content::new(None, "x"))
            .await
            .unwrap();
        assert!(f.service.get("r", &key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replication_watchers_fire_on_relevant_changes() {
        let f = fixture();
        let mut watcher = f.watchers.subscribe();
        let plain = f
            .service
            .create_channel(ChannelConfig::new("n", T0))
            .await
            .unwrap();
        assert_eq!(f.watchers.version(), 0);

        let source = url::Url::parse("http://upstream/channel/n").unwrap();
        let replicating = f
            .service
            .update_channel(plain.clone().with_replication_source(source), Some(&plain))
            .await
            .unwrap();
        watcher.changed().await.unwrap();

        f.service
            .update_channel(plain, Some(&replicating))
            .await
            .unwrap();
        assert_eq!(f.watchers.version(), 2);

        assert!(f.service.delete("n").await.unwrap());
        assert_eq!(f.watchers.version(), 2);
        assert!(!f.service.delete("n").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_conflicts_and_update_without_changes() {
        let f = fixture();
        let config = ChannelConfig::new("dup", T0).with_tags(["a", "b"]);
        f.service.create_channel(config.clone()).await.unwrap();
        assert!(matches!(
            f.service.create_channel(config.clone()).await,
            Err(HubError::Conflict(_))
        ));
        f.service
            .create_channel(ChannelConfig::new("other", T0).with_tags(["b", "c"]))
            .await
            .unwrap();

        let unchanged = f
            .service
            .update_channel(config.clone(), Some(&config))
            .await
            .unwrap();
        assert_eq!(unchanged, config);
        assert_eq!(f.service.get_channels_by_tag("a").await.unwrap().len(), 1);
        assert_eq!(
            f.service.get_tags().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn test_delete_removes_content() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("gone", T0))
            .await
            .unwrap();
        let key = insert_at(&f, "gone", T0).await;
        assert!(f.service.delete("gone").await.unwrap());
        assert!(f.store.get("gone", &key).await.unwrap().is_none());
        assert!(matches!(
            f.service.get("gone", &key).await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_before_keeps_later_items() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("UHF", T0))
            .await
            .unwrap();
        let k0 = insert_at(&f, "UHF", T0).await;
        let k1 = insert_at(&f, "UHF", T0 + Duration::seconds(1)).await;
        let k2 = insert_at(&f, "UHF", T0 + Duration::seconds(2)).await;
        f.clock.set(T0 + Duration::minutes(1));

        assert_eq!(f.service.delete_before("UHF", &k2).await.unwrap(), 2);
        assert!(f.service.get("UHF", &k0).await.unwrap().is_none());
        assert!(f.service.get("UHF", &k1).await.unwrap().is_none());
        assert!(f.service.get("UHF", &k2).await.unwrap().is_some());

        let start = ContentKey::first_key(T0 - Duration::minutes(1));
        let keys = f
            .service
            .get_keys(DirectionQuery::next("UHF", start, 10))
            .await
            .unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![k2]);
    }

    #[tokio::test]
    async fn test_get_refuses_expired_items() {
        let f = fixture();
        f.service
            .create_channel(ChannelConfig::new("old", T0).with_ttl_days(1))
            .await
            .unwrap();
        let key = insert_at(&f, "old", T0).await;
        f.clock.set(T0 + Duration::days(1) + Duration::minutes(10));
        assert!(f.service.get("old", &key).await.unwrap().is_some());
        f.clock.set(T0 + Duration::days(1) + Duration::minutes(16));
        assert!(f.service.get("old", &key).await.unwrap().is_none());
    }
}
