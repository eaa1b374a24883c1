//! Writes items pushed by an upstream hub into the local replica.

use super::ReplicationError;
use super::upstream::UpstreamHub;
use crate::channel::ChannelService;
use crate::cluster::{CursorKind, CursorStore};
use crate::error::HubError;
use crate::model::ContentKey;
use crate::storage::Content;
use hub_sdk::objects::WebhookPayload;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub struct ReplicationReceiver {
    channels: Arc<ChannelService>,
    cursors: Arc<dyn CursorStore>,
    upstream: Arc<dyn UpstreamHub>,
}

impl ReplicationReceiver {
    pub fn new(
        channels: Arc<ChannelService>,
        cursors: Arc<dyn CursorStore>,
        upstream: Arc<dyn UpstreamHub>,
    ) -> Self {
        Self {
            channels,
            cursors,
            upstream,
        }
    }

    /// Fetch every item of `payload` and store it under its upstream key.
    /// Returns the number of items written.
    ///
    /// Items are processed in payload order and the first failure aborts
    /// the rest, so the upstream webhook retries from the failed item.
    pub async fn receive(
        &self,
        channel: &str,
        payload: &WebhookPayload,
    ) -> Result<usize, ReplicationError> {
        let config = self
            .channels
            .get_channel_config(channel, true)
            .await?
            .ok_or_else(|| HubError::not_found(format!("channel {channel}")))?;
        if !config.is_replicating() {
            return Err(HubError::Forbidden(format!("channel {channel} is not replicating")).into());
        }

        let mut written = 0;
        for uri in &payload.uris {
            let url = Url::parse(uri).map_err(|_| ReplicationError::InvalidUri(uri.clone()))?;
            let key =
                key_from_item_uri(&url).ok_or_else(|| ReplicationError::InvalidUri(uri.clone()))?;
            let item = self.upstream.fetch(&url).await?;
            self.channels
                .historical_insert(channel, &key, Content::new(item.content_type, item.data))
                .await?;
            self.advance_cursor(channel, &key).await?;
            written += 1;
        }
        debug!(%channel, written, "Replicated items");
        Ok(written)
    }

    async fn advance_cursor(&self, channel: &str, key: &ContentKey) -> Result<(), HubError> {
        let kind = CursorKind::ReplicationLastUpdated;
        let current = self.cursors.get_or_null(channel, kind).await?;
        if current.as_ref().is_none_or(|c| key > c) {
            self.cursors.update(channel, kind, key).await?;
        }
        Ok(())
    }
}

/// The key of a `.../channel/{name}/{key}` item URI.
pub fn key_from_item_uri(uri: &Url) -> Option<ContentKey> {
    let segments: Vec<&str> = uri.path_segments()?.filter(|s| !s.is_empty()).collect();
    let channel_at = segments.iter().position(|s| *s == "channel")?;
    let key_segments = segments.get(channel_at + 2..)?;
    ContentKey::from_url(&key_segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::testing::MockUpstream;
    use crate::testing::HubFixture;
    use time::macros::datetime;

    #[test]
    fn test_key_from_item_uri() {
        let key = ContentKey::new(datetime!(2024-06-10 11:59:58.123 UTC), "abc123");
        let uri = Url::parse(&format!("http://up/channel/UHF/{}", key.to_url())).unwrap();
        assert_eq!(key_from_item_uri(&uri), Some(key));
        let prefixed = Url::parse("http://up/hub/channel/UHF/2024/06/10/11/59/58/123/x").unwrap();
        assert!(key_from_item_uri(&prefixed).is_some());
        assert_eq!(key_from_item_uri(&Url::parse("http://up/channel/UHF").unwrap()), None);
        assert_eq!(key_from_item_uri(&Url::parse("http://up/other/x").unwrap()), None);
    }

    async fn replica(f: &HubFixture) {
        let source = Url::parse("http://up/channel/UHF").unwrap();
        let config = crate::model::ChannelConfig::new("UHF", datetime!(2024-06-01 00:00 UTC))
            .with_replication_source(source);
        f.channels.create_channel(config).await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_writes_under_upstream_keys() {
        let f = HubFixture::new().await;
        replica(&f).await;
        let upstream = Arc::new(MockUpstream::default());
        let receiver = ReplicationReceiver::new(f.channels.clone(), f.cursors.clone(), upstream);

        let k1 = ContentKey::new(datetime!(2024-06-10 11:59:50 UTC), "aaa111");
        let k2 = ContentKey::new(datetime!(2024-06-10 11:59:51 UTC), "bbb222");
        let uris = [&k1, &k2]
            .iter()
            .map(|k| format!("http://up/channel/UHF/{}", k.to_url()))
            .collect();
        let written = receiver
            .receive("UHF", &WebhookPayload::items("Repl_hub_local_UHF", uris))
            .await
            .unwrap();

        assert_eq!(written, 2);
        let stored = f.channels.get("UHF", &k2).await.unwrap().unwrap();
        assert_eq!(stored.data.as_ref(), k2.to_url().as_bytes());
        let cursor = f
            .cursors
            .get_or_null("UHF", CursorKind::ReplicationLastUpdated)
            .await
            .unwrap();
        assert_eq!(cursor, Some(k2));
    }

    #[tokio::test]
    async fn test_cursor_never_moves_back() {
        let f = HubFixture::new().await;
        replica(&f).await;
        let receiver = ReplicationReceiver::new(
            f.channels.clone(),
            f.cursors.clone(),
            Arc::new(MockUpstream::default()),
        );
        let newer = ContentKey::new(datetime!(2024-06-10 11:59:51 UTC), "b");
        let older = ContentKey::new(datetime!(2024-06-10 11:59:50 UTC), "a");
        for key in [&newer, &older] {
            let uri = format!("http://up/channel/UHF/{}", key.to_url());
            receiver
                .receive("UHF", &WebhookPayload::items("g", vec![uri]))
                .await
                .unwrap();
        }
        let cursor = f
            .cursors
            .get_or_null("UHF", CursorKind::ReplicationLastUpdated)
            .await
            .unwrap();
        assert_eq!(cursor, Some(newer));
    }

    #[tokio::test]
    async fn test_rejects_non_replicating_channel() {
        let f = HubFixture::new().await;
        let receiver = ReplicationReceiver::new(
            f.channels.clone(),
            f.cursors.clone(),
            Arc::new(MockUpstream::default()),
        );
        let result = receiver.receive("feed", &WebhookPayload::items("g", vec![])).await;
        assert!(matches!(result, Err(ReplicationError::Hub(HubError::Forbidden(_)))));
        let result = receiver.receive("nope", &WebhookPayload::items("g", vec![])).await;
        assert!(matches!(result, Err(ReplicationError::Hub(HubError::NotFound(_)))));
    }
}
