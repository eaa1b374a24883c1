//! The delivery loop a webhook runs while its process leads it.

use super::delivery::{WebhookDelivery, calculate_retry_delay};
use super::status::DeliveryState;
use crate::channel::ChannelService;
use crate::cluster::{CursorKind, CursorStart, CursorStore, Leader, Leadership};
use crate::config::WebhookSettings;
use crate::model::{ContentKey, DirectionQuery, Webhook};
use anyhow::Context;
use async_trait::async_trait;
use hub_sdk::objects::{BatchMode, WebhookPayload};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a webhook's delivery loop needs besides its definition.
pub struct WebhookContext {
    pub channels: Arc<ChannelService>,
    pub cursors: Arc<dyn CursorStore>,
    pub delivery: Arc<dyn WebhookDelivery>,
    pub settings: WebhookSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Delivered,
    /// Attempts exhausted; the cursor moves past the items anyway.
    Skipped,
    Revoked,
    /// The stored cursor was re-pointed to this key mid-delivery.
    Replayed(ContentKey),
}

/// Delivers a webhook's channel items in key order, moving the cursor
/// after every completed callback.
///
/// A term reads the cursor first, so a new leader resumes exactly where
/// the last completed delivery of any previous leader ended. Items
/// delivered but not yet recorded are delivered again.
pub struct WebhookLeader {
    webhook: Webhook,
    channel: String,
    context: Arc<WebhookContext>,
    state: Arc<DeliveryState>,
}

impl WebhookLeader {
    /// `None` if the webhook's channel URL names no channel.
    pub fn new(
        webhook: Webhook,
        context: Arc<WebhookContext>,
        state: Arc<DeliveryState>,
    ) -> Option<Self> {
        let channel = webhook.channel_name()?.to_owned();
        Some(Self {
            webhook,
            channel,
            context,
            state,
        })
    }

    async fn starting_point(&self) -> anyhow::Result<ContentKey> {
        let cursors = &self.context.cursors;
        let kind = CursorKind::WebhookLastCompleted;
        if let Some(key) = cursors.get_or_null(&self.webhook.name, kind).await? {
            return Ok(key);
        }
        let channels = &self.context.channels;
        let default = match channels.get_latest(&self.channel, false).await {
            Ok(Some(latest)) => latest,
            _ => ContentKey::first_key(channels.times().now()),
        };
        cursors
            .initialize(&self.webhook.name, kind, CursorStart::Default(default.clone()))
            .await?;
        Ok(cursors
            .get_or_null(&self.webhook.name, kind)
            .await?
            .unwrap_or(default))
    }

    /// The stored cursor, if a replay moved it away from `last`.
    async fn replayed(&self, last: &ContentKey) -> Option<ContentKey> {
        let stored = self
            .context
            .cursors
            .get_or_null(&self.webhook.name, CursorKind::WebhookLastCompleted)
            .await;
        match stored {
            Ok(Some(stored)) if &stored != last => Some(stored),
            _ => None,
        }
    }

    fn item_uri(&self, key: &ContentKey) -> String {
        let channel_url = self.webhook.channel_url.as_str().trim_end_matches('/');
        format!("{channel_url}/{}", key.to_url())
    }

    async fn deliver_with_retry(
        &self,
        keys: &[ContentKey],
        last: &ContentKey,
        leadership: &Leadership,
    ) -> Outcome {
        let name = &self.webhook.name;
        let payload = WebhookPayload::items(
            name.clone(),
            keys.iter().map(|k| self.item_uri(k)).collect(),
        );
        self.state.set_in_flight(keys);

        let mut attempts: u32 = 0;
        let outcome = loop {
            let result = tokio::select! {
                biased;
                _ = leadership.lost() => None,
                result = self.context.delivery.deliver(&self.webhook, &payload) => Some(result),
            };
            let Some(result) = result else {
                break Outcome::Revoked;
            };
            let error = match result {
                Ok(()) => break Outcome::Delivered,
                Err(e) => e,
            };

            attempts += 1;
            self.state.record_error(format!("{}: {error}", payload.uris.join(", ")));
            if self.webhook.max_attempts > 0 && attempts >= self.webhook.max_attempts {
                warn!(webhook = %name, attempts, error = %error, "Giving up on delivery");
                break Outcome::Skipped;
            }
            let max_exponent = self.context.settings.max_retry_exponent;
            let delay = calculate_retry_delay(attempts - 1, max_exponent);
            warn!(
                webhook = %name,
                attempts,
                retry_in = ?delay,
                error = %error,
                "Delivery failed, retrying"
            );
            if !leadership.sleep(delay).await {
                break Outcome::Revoked;
            }
            if let Some(stored) = self.replayed(last).await {
                break Outcome::Replayed(stored);
            }
        };

        self.state.clear_in_flight();
        outcome
    }
}

#[async_trait]
impl Leader for WebhookLeader {
    async fn take_leadership(&self, leadership: &Leadership) -> anyhow::Result<()> {
        let name = &self.webhook.name;
        let poll_interval = self.context.settings.poll_interval;
        let mut last = self.starting_point().await?;
        info!(webhook = %name, cursor = %last, "Delivering webhook");

        while leadership.has_leadership() {
            // A replay re-points the stored cursor under a running leader.
            let stored = self
                .context
                .cursors
                .get_or_null(name, CursorKind::WebhookLastCompleted)
                .await;
            if let Ok(Some(stored)) = stored {
                if stored != last {
                    info!(webhook = %name, cursor = %stored, "Cursor was re-pointed");
                    last = stored;
                }
            }

            let query = DirectionQuery::next(
                self.channel.clone(),
                last.clone(),
                self.context.settings.keys_per_poll,
            );
            let keys = match self.context.channels.get_keys(query).await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(webhook = %name, error = %e, "Failed to query channel");
                    self.state.record_error(e.to_string());
                    if !leadership.sleep(poll_interval).await {
                        break;
                    }
                    continue;
                }
            };
            if keys.is_empty() {
                if !leadership.sleep(poll_interval).await {
                    break;
                }
                continue;
            }

            debug!(webhook = %name, count = keys.len(), "Found new items");
            let keys: Vec<ContentKey> = keys.into_iter().collect();
            let batches: Vec<Vec<ContentKey>> = match self.webhook.batch {
                BatchMode::Single => keys.into_iter().map(|k| vec![k]).collect(),
                BatchMode::Batch => vec![keys],
            };
            for batch in batches {
                match self.deliver_with_retry(&batch, &last, leadership).await {
                    Outcome::Revoked => return Ok(()),
                    Outcome::Replayed(stored) => {
                        info!(webhook = %name, cursor = %stored, "Cursor was re-pointed");
                        last = stored;
                        break;
                    }
                    Outcome::Delivered | Outcome::Skipped => {}
                }
                let Some(newest) = batch.last() else {
                    continue;
                };
                // Never overwrite a replay that landed during the callback.
                if let Some(stored) = self.replayed(&last).await {
                    info!(webhook = %name, cursor = %stored, "Cursor was re-pointed");
                    last = stored;
                    break;
                }
                self.context
                    .cursors
                    .update(name, CursorKind::WebhookLastCompleted, newest)
                    .await
                    .with_context(|| format!("failed to record delivery of {newest} for {name}"))?;
                last = newest.clone();
            }
        }

        info!(webhook = %name, cursor = %last, "Stopped delivering webhook");
        Ok(())
    }
}
