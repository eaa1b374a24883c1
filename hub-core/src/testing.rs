//! Shared fixtures for tests that need a running hub.

use crate::channel::{ChannelConfigCache, ChannelService, CoordinatorChannelConfigDao};
use crate::clock::{Clock, ManualClock, TimeSource};
use crate::cluster::{CursorKind, CursorStart, CursorStore, InMemoryCoordinator, LastContentPath};
use crate::config::{ElectionSettings, QuerySettings, WebhookSettings};
use crate::error::HubError;
use crate::model::{ChannelConfig, ContentKey, Webhook};
use crate::notify::Watchers;
use crate::storage::{Content, ContentQueries, InMemoryContentStore};
use crate::webhook::{
    CoordinatorWebhookDao, DeliveryError, DeliveryState, WebhookContext, WebhookDelivery,
    WebhookLeader, WebhookProcessor, WebhookService,
};
use async_trait::async_trait;
use hub_sdk::objects::WebhookPayload;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::macros::datetime;
use url::Url;

pub const CHANNEL_URL: &str = "http://hub/channel/feed";

/// Wait for `check` to hold. Paused-clock tests sleep through retry
/// backoffs inside this window, so it is generous.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(120), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

/// Records payloads; fails the first `failures` attempts.
#[derive(Default)]
pub struct MockDelivery {
    failures_left: AtomicU32,
    attempts: AtomicUsize,
    payloads: Mutex<Vec<WebhookPayload>>,
}

impl MockDelivery {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful payloads.
    pub fn payloads(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().unwrap().clone()
    }

    /// URIs of every successful payload, in delivery order.
    pub fn delivered(&self) -> Vec<String> {
        self.payloads().into_iter().flat_map(|p| p.uris).collect()
    }
}

#[async_trait]
impl WebhookDelivery for MockDelivery {
    async fn deliver(&self, _: &Webhook, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DeliveryError::Rejected {
                status: 500,
                body: "unavailable".into(),
            });
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Cursor store whose updates can be made to fail.
pub struct FlakyCursors {
    inner: LastContentPath,
    update_failures: AtomicUsize,
}

impl FlakyCursors {
    pub fn fail_next_updates(&self, n: usize) {
        self.update_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl CursorStore for FlakyCursors {
    async fn initialize(
        &self,
        name: &str,
        kind: CursorKind,
        start: CursorStart,
    ) -> Result<(), HubError> {
        self.inner.initialize(name, kind, start).await
    }

    async fn get_or_null(
        &self,
        name: &str,
        kind: CursorKind,
    ) -> Result<Option<ContentKey>, HubError> {
        self.inner.get_or_null(name, kind).await
    }

    async fn update(&self, name: &str, kind: CursorKind, key: &ContentKey) -> Result<(), HubError> {
        let failed = self
            .update_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(HubError::Coordination(
                crate::cluster::CoordinationError::Unavailable("injected".into()),
            ));
        }
        self.inner.update(name, kind, key).await
    }

    async fn delete(&self, name: &str, kind: CursorKind) -> Result<(), HubError> {
        self.inner.delete(name, kind).await
    }
}

/// A hub with one channel, `feed`, and a webhook `w` on it.
pub struct HubFixture {
    pub cluster: InMemoryCoordinator,
    pub clock: Arc<ManualClock>,
    pub channels: Arc<ChannelService>,
    pub replication_watchers: Watchers,
    pub cursors: Arc<FlakyCursors>,
    pub dao: Arc<CoordinatorWebhookDao>,
    pub delivery: Arc<MockDelivery>,
    pub context: Arc<WebhookContext>,
}

impl HubFixture {
    pub async fn new() -> Self {
        Self::with_delivery(MockDelivery::default()).await
    }

    pub async fn with_delivery(delivery: MockDelivery) -> Self {
        let cluster = InMemoryCoordinator::new();
        let session = Arc::new(cluster.session());
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-10 12:00:00 UTC)));
        let times = TimeSource::new(clock.clone(), time::Duration::seconds(5));
        let queries = ContentQueries::new(
            Arc::new(InMemoryContentStore::new(2)),
            times,
            QuerySettings::default(),
        );
        let replication_watchers = Watchers::new();
        let config_dao = Arc::new(CoordinatorChannelConfigDao::new(session.clone()));
        let channels = Arc::new(ChannelService::new(
            ChannelConfigCache::new(config_dao, Duration::ZERO),
            queries,
            replication_watchers.clone(),
        ));
        let cursors = Arc::new(FlakyCursors {
            inner: LastContentPath::new(session.clone()),
            update_failures: AtomicUsize::new(0),
        });
        let dao = Arc::new(CoordinatorWebhookDao::new(session));
        let delivery = Arc::new(delivery);
        let context = Arc::new(WebhookContext {
            channels: channels.clone(),
            cursors: cursors.clone(),
            delivery: delivery.clone(),
            settings: WebhookSettings {
                poll_interval: Duration::from_millis(10),
                reconcile_interval: Duration::from_secs(3600),
                election: ElectionSettings {
                    requeue_delay: Duration::from_millis(5),
                    error_backoff: Duration::from_millis(20),
                },
                ..WebhookSettings::default()
            },
        });
        let fixture = Self {
            cluster,
            clock,
            channels,
            replication_watchers,
            cursors,
            dao,
            delivery,
            context,
        };
        fixture.create_channel("feed").await;
        fixture
    }

    pub async fn create_channel(&self, name: &str) {
        let config = ChannelConfig::new(name, self.clock.now());
        self.channels.create_channel(config).await.unwrap();
    }

    /// Insert into `feed` one second after the previous insert.
    pub async fn insert(&self) -> ContentKey {
        let key = self
            .channels
            .insert("feed", Content::new(None, "item"))
            .await
            .unwrap();
        self.clock.advance(time::Duration::seconds(1));
        key
    }

    /// Move the clock until everything inserted so far is stable.
    pub fn settle(&self) {
        self.clock.advance(time::Duration::minutes(1));
    }

    pub fn webhook(&self) -> Webhook {
        Webhook::new(
            "w",
            Url::parse(CHANNEL_URL).unwrap(),
            Url::parse("http://client/callback").unwrap(),
        )
    }

    pub fn uri(&self, key: &ContentKey) -> String {
        format!("{CHANNEL_URL}/{}", key.to_url())
    }

    pub async fn set_cursor(&self, key: &ContentKey) {
        self.cursors
            .update("w", CursorKind::WebhookLastCompleted, key)
            .await
            .unwrap();
    }

    pub async fn cursor(&self) -> Option<ContentKey> {
        self.cursors
            .get_or_null("w", CursorKind::WebhookLastCompleted)
            .await
            .unwrap()
    }

    pub fn leader(&self, webhook: Webhook) -> WebhookLeader {
        self.leader_with_state(webhook, Arc::new(DeliveryState::default()))
    }

    pub fn leader_with_state(&self, webhook: Webhook, state: Arc<DeliveryState>) -> WebhookLeader {
        WebhookLeader::new(webhook, self.context.clone(), state).unwrap()
    }

    /// A processor on its own coordination session, as in a separate process.
    pub fn processor(&self) -> WebhookProcessor {
        WebhookProcessor::new(
            self.dao.clone(),
            Arc::new(self.cluster.session()),
            self.context.clone(),
            Watchers::new(),
        )
    }

    pub fn service(&self, processor: Arc<WebhookProcessor>) -> WebhookService {
        WebhookService::new(
            self.dao.clone(),
            self.channels.clone(),
            self.cursors.clone(),
            processor,
        )
    }
}
