//! Webhook lifecycle: validation, cursor seeding and persistence.

use super::dao::WebhookDao;
use super::processor::WebhookProcessor;
use super::status::WebhookStatus;
use super::validator::validate_webhook;
use crate::channel::ChannelService;
use crate::cluster::{CursorKind, CursorStart, CursorStore};
use crate::error::HubError;
use crate::model::{ContentKey, Webhook};
use std::sync::Arc;
use tracing::info;

pub struct WebhookService {
    dao: Arc<dyn WebhookDao>,
    channels: Arc<ChannelService>,
    cursors: Arc<dyn CursorStore>,
    processor: Arc<WebhookProcessor>,
}

impl WebhookService {
    pub fn new(
        dao: Arc<dyn WebhookDao>,
        channels: Arc<ChannelService>,
        cursors: Arc<dyn CursorStore>,
        processor: Arc<WebhookProcessor>,
    ) -> Self {
        Self {
            dao,
            channels,
            cursors,
            processor,
        }
    }

    /// Create or update a webhook, returning the prior definition.
    ///
    /// Re-submitting an identical definition without a starting key
    /// changes nothing. A starting key always re-points the cursor. A new
    /// webhook without one starts after the channel's latest item.
    pub async fn upsert(&self, webhook: Webhook) -> Result<Option<Webhook>, HubError> {
        let mut webhook = webhook.with_defaults();
        validate_webhook(&webhook)?;
        let channel = webhook.channel_name().unwrap_or_default().to_owned();
        if !self.channels.channel_exists(&channel).await? {
            return Err(HubError::Invalid(format!("channel {channel} does not exist")));
        }

        let existing = self.dao.get(&webhook.name).await?;
        if let Some(existing) = &existing {
            if webhook.starting_key.is_none() && webhook.same_definition(existing) {
                return Ok(Some(existing.clone()));
            }
            if !webhook.allowed_to_change(existing) {
                return Err(HubError::Conflict(format!(
                    "channelUrl of webhook {} cannot change from {}",
                    webhook.name, existing.channel_url
                )));
            }
        }

        let kind = CursorKind::WebhookLastCompleted;
        match webhook.starting_key.take() {
            Some(key) => {
                info!(webhook = %webhook.name, %key, "Re-pointing webhook cursor");
                self.cursors
                    .initialize(&webhook.name, kind, CursorStart::Resume(key))
                    .await?;
            }
            None => {
                let start = match self.channels.get_latest(&channel, false).await? {
                    Some(latest) => latest,
                    None => ContentKey::first_key(self.channels.times().now()),
                };
                self.cursors
                    .initialize(&webhook.name, kind, CursorStart::Default(start))
                    .await?;
            }
        }

        self.dao.upsert(&webhook).await?;
        info!(webhook = %webhook.name, channel = %channel, "Upserted webhook");
        self.processor.watchers().notify();
        Ok(existing)
    }

    pub async fn get(&self, name: &str) -> Result<Option<Webhook>, HubError> {
        self.dao.get(name).await
    }

    pub async fn get_all(&self) -> Result<Vec<Webhook>, HubError> {
        self.dao.get_all().await
    }

    /// Remove a webhook and its cursor. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, HubError> {
        let existed = self.dao.get(name).await?.is_some();
        self.dao.delete(name).await?;
        self.processor.stop(name).await;
        self.cursors
            .delete(name, CursorKind::WebhookLastCompleted)
            .await?;
        if existed {
            info!(webhook = %name, "Deleted webhook");
        }
        self.processor.watchers().notify();
        Ok(existed)
    }

    pub async fn get_status(&self, name: &str) -> Result<WebhookStatus, HubError> {
        let webhook = self
            .dao
            .get(name)
            .await?
            .ok_or_else(|| HubError::not_found(format!("webhook {name}")))?;
        let channel_latest = match webhook.channel_name() {
            Some(channel) => self.channels.get_latest(channel, true).await.ok().flatten(),
            None => None,
        };
        let last_completed = self
            .cursors
            .get_or_null(name, CursorKind::WebhookLastCompleted)
            .await?;
        let (leading, in_flight, errors) = match self.processor.delivery_state(name).await {
            Some((leading, state)) => (leading, state.in_flight(), state.errors()),
            None => (false, Vec::new(), Vec::new()),
        };
        Ok(WebhookStatus {
            name: webhook.name,
            channel_latest,
            last_completed,
            leading,
            in_flight,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HubFixture, eventually};
    use tokio::sync::watch;
    use url::Url;

    #[tokio::test]
    async fn test_new_webhook_starts_after_latest() {
        let f = HubFixture::new().await;
        f.insert().await;
        let k5 = f.insert().await;
        let service = f.service(Arc::new(f.processor()));

        assert_eq!(service.upsert(f.webhook()).await.unwrap(), None);
        assert_eq!(f.cursor().await, Some(k5));
        assert_eq!(service.get("w").await.unwrap().unwrap().name, "w");
    }

    #[tokio::test]
    async fn test_identical_upsert_is_noop() {
        let f = HubFixture::new().await;
        let k1 = f.insert().await;
        let service = f.service(Arc::new(f.processor()));
        service.upsert(f.webhook()).await.unwrap();
        assert_eq!(f.cursor().await, Some(k1));
        let k2 = f.insert().await;
        f.set_cursor(&k2).await;

        let prior = service.upsert(f.webhook()).await.unwrap();
        assert_eq!(prior.map(|w| w.name), Some("w".to_owned()));
        assert_eq!(f.cursor().await, Some(k2));
    }

    #[tokio::test]
    async fn test_starting_key_replays() {
        let f = HubFixture::new().await;
        let k1 = f.insert().await;
        f.insert().await;
        let service = f.service(Arc::new(f.processor()));
        service.upsert(f.webhook()).await.unwrap();

        service
            .upsert(f.webhook().with_starting_key(k1.clone()))
            .await
            .unwrap();
        assert_eq!(f.cursor().await, Some(k1));
        // The stored definition does not carry the one-shot key.
        assert_eq!(service.get("w").await.unwrap().unwrap().starting_key, None);
    }

    #[tokio::test]
    async fn test_channel_change_conflicts_without_mutation() {
        let f = HubFixture::new().await;
        let service = f.service(Arc::new(f.processor()));
        service.upsert(f.webhook()).await.unwrap();
        f.create_channel("other").await;
        let before = f.cursor().await;

        let moved = Webhook::new(
            "w",
            Url::parse("http://hub/channel/other").unwrap(),
            Url::parse("http://cb/").unwrap(),
        );
        let result = service.upsert(moved).await;
        assert!(matches!(result, Err(HubError::Conflict(_))));
        let stored = service.get("w").await.unwrap().unwrap();
        assert_eq!(stored.channel_name(), Some("feed"));
        assert_eq!(f.cursor().await, before);
    }

    #[tokio::test]
    async fn test_rejects_invalid_webhooks() {
        let f = HubFixture::new().await;
        let service = f.service(Arc::new(f.processor()));
        let missing = Webhook::new(
            "w",
            Url::parse("http://hub/channel/missing").unwrap(),
            Url::parse("http://cb/").unwrap(),
        );
        assert!(matches!(service.upsert(missing).await, Err(HubError::Invalid(_))));
        let mut bad_name = f.webhook();
        bad_name.name = "has space".into();
        assert!(matches!(service.upsert(bad_name).await, Err(HubError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_cursor() {
        let f = HubFixture::new().await;
        f.insert().await;
        let service = f.service(Arc::new(f.processor()));
        service.upsert(f.webhook()).await.unwrap();
        assert!(service.delete("w").await.unwrap());
        assert!(!service.delete("w").await.unwrap());
        assert_eq!(f.cursor().await, None);
        assert!(service.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upserted_webhook_delivers_next_item_once() {
        let f = HubFixture::new().await;
        f.insert().await;
        f.settle();
        let processor = Arc::new(f.processor());
        let service = f.service(processor.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(processor.clone().run(shutdown_rx));

        service.upsert(f.webhook()).await.unwrap();
        let k6 = f.insert().await;
        f.settle();

        eventually(|| f.delivery.delivered().len() == 1).await;
        let status = service.get_status("w").await.unwrap();
        assert_eq!(status.channel_latest, Some(k6.clone()));
        assert_eq!(f.delivery.delivered(), vec![f.uri(&k6)]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(f.cursor().await, Some(k6));
    }
}
