//! Application state shared across all request handlers, and the wiring
//! that builds it from the loaded configuration.

use crate::config::LoadedConfig;
use hub_core::channel::{
    ChannelConfigCache, ChannelConfigDao, ChannelService, CoordinatorChannelConfigDao,
};
use hub_core::clock::TimeSource;
use hub_core::cluster::{Coordinator, CursorStore, InMemoryCoordinator, LastContentPath};
use hub_core::model::ContentKey;
use hub_core::notify::Watchers;
use hub_core::persistence::PgStateStore;
use hub_core::replication::{HttpUpstream, ReplicationManager, ReplicationReceiver, UpstreamHub};
use hub_core::storage::{ContentQueries, ContentStore, InMemoryContentStore, PgContentStore};
use hub_core::webhook::{
    CoordinatorWebhookDao, HttpDelivery, WebhookContext, WebhookDao, WebhookDelivery,
    WebhookProcessor, WebhookService,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub channels: Arc<ChannelService>,
    pub webhooks: Arc<WebhookService>,
    pub replication: Arc<ReplicationManager>,
    pub receiver: Arc<ReplicationReceiver>,
    /// Public base URL with a trailing `/`.
    pub app_url: Arc<str>,
}

impl AppState {
    /// Absolute URI of an item, as handed out to clients and webhooks.
    pub fn item_uri(&self, channel: &str, key: &ContentKey) -> String {
        format!("{}/{}", self.channel_url(channel), key.to_url())
    }

    pub fn channel_url(&self, channel: &str) -> String {
        format!("{}channel/{channel}", self.app_url)
    }
}

/// Everything the server runs: request state plus the background
/// workers `main` drives.
pub struct Hub {
    pub state: AppState,
    pub processor: Arc<WebhookProcessor>,
    pub coordinator: Arc<dyn Coordinator>,
}

/// Persistence for one backend.
struct Stores {
    content: Arc<dyn ContentStore>,
    configs: Arc<dyn ChannelConfigDao>,
    webhooks: Arc<dyn WebhookDao>,
    cursors: Arc<dyn CursorStore>,
}

impl Stores {
    fn memory(coordinator: &Arc<dyn Coordinator>, max_page_size: usize) -> Self {
        Self {
            content: Arc::new(InMemoryContentStore::new(max_page_size)),
            configs: Arc::new(CoordinatorChannelConfigDao::new(coordinator.clone())),
            webhooks: Arc::new(CoordinatorWebhookDao::new(coordinator.clone())),
            cursors: Arc::new(LastContentPath::new(coordinator.clone())),
        }
    }

    fn postgres(pool: PgPool, max_page_size: usize) -> Self {
        let state = Arc::new(PgStateStore::new(pool.clone()));
        Self {
            content: Arc::new(PgContentStore::new(pool, max_page_size)),
            configs: state.clone(),
            webhooks: state.clone(),
            cursors: state,
        }
    }
}

impl Hub {
    /// Wire the hub. Without a pool everything lives in memory.
    ///
    /// Coordination is always the in-process service: this server runs as
    /// a single-node cluster.
    pub fn build(config: &LoadedConfig, pool: Option<PgPool>) -> anyhow::Result<Self> {
        let coordinator: Arc<dyn Coordinator> = Arc::new(InMemoryCoordinator::new().session());
        let delivery: Arc<dyn WebhookDelivery> =
            Arc::new(HttpDelivery::new(config.webhooks.request_timeout));
        let upstream: Arc<dyn UpstreamHub> = Arc::new(HttpUpstream::new(config.upstream_timeout));
        Self::assemble(config, pool, coordinator, delivery, upstream)
    }

    fn assemble(
        config: &LoadedConfig,
        pool: Option<PgPool>,
        coordinator: Arc<dyn Coordinator>,
        delivery: Arc<dyn WebhookDelivery>,
        upstream: Arc<dyn UpstreamHub>,
    ) -> anyhow::Result<Self> {
        let stores = match pool {
            Some(pool) => Stores::postgres(pool, config.max_page_size),
            None => Stores::memory(&coordinator, config.max_page_size),
        };

        let times = TimeSource::system(time::Duration::try_from(config.hub.stable_skew)?);
        let queries = ContentQueries::new(stores.content, times, config.hub.query.clone());
        let replication_watchers = Watchers::new();
        let channels = Arc::new(ChannelService::new(
            ChannelConfigCache::new(stores.configs, config.hub.channel_cache_ttl),
            queries,
            replication_watchers.clone(),
        ));

        let context = Arc::new(WebhookContext {
            channels: channels.clone(),
            cursors: stores.cursors.clone(),
            delivery,
            settings: config.webhooks.clone(),
        });
        let processor = Arc::new(WebhookProcessor::new(
            stores.webhooks.clone(),
            coordinator.clone(),
            context,
            Watchers::new(),
        ));
        let webhooks = Arc::new(WebhookService::new(
            stores.webhooks,
            channels.clone(),
            stores.cursors.clone(),
            processor.clone(),
        ));

        let replication = Arc::new(ReplicationManager::new(
            channels.clone(),
            stores.cursors.clone(),
            coordinator.clone(),
            upstream.clone(),
            config.replication.clone(),
            replication_watchers,
        ));
        let receiver = Arc::new(ReplicationReceiver::new(
            channels.clone(),
            stores.cursors,
            upstream,
        ));

        Ok(Self {
            state: AppState {
                channels,
                webhooks,
                replication,
                receiver,
                app_url: Arc::from(config.hub.app_url.as_str()),
            },
            processor,
            coordinator,
        })
    }

    /// An in-memory hub with the given delivery and upstream doubles.
    #[cfg(test)]
    pub fn for_tests(
        config: &LoadedConfig,
        delivery: Arc<dyn WebhookDelivery>,
        upstream: Arc<dyn UpstreamHub>,
    ) -> Self {
        let coordinator: Arc<dyn Coordinator> = Arc::new(InMemoryCoordinator::new().session());
        Self::assemble(config, None, coordinator, delivery, upstream).unwrap()
    }
}
