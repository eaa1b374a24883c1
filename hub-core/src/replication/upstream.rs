//! Access to the hubs that replicating channels copy from.

use crate::model::ContentKey;
use crate::model::webhook::channel_name_from_url;
use async_trait::async_trait;
use hub_sdk::client::{ClientError, FetchedItem, HubClient};
use hub_sdk::objects::WebhookRequest;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait UpstreamHub: Send + Sync {
    /// Create or update a webhook on the hub serving `source`.
    async fn register(
        &self,
        source: &Url,
        name: &str,
        request: &WebhookRequest,
    ) -> Result<(), ClientError>;

    async fn unregister(&self, source: &Url, name: &str) -> Result<(), ClientError>;

    /// Latest stable key of the source channel.
    async fn latest(&self, source: &Url) -> Result<Option<ContentKey>, ClientError>;

    async fn fetch(&self, uri: &Url) -> Result<FetchedItem, ClientError>;
}

/// Talks to upstream hubs over their HTTP API.
pub struct HttpUpstream {
    http_client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn client(&self, source: &Url) -> HubClient {
        let mut base = source.clone();
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);
        HubClient::new(base).with_http_client(self.http_client.clone())
    }
}

#[async_trait]
impl UpstreamHub for HttpUpstream {
    async fn register(
        &self,
        source: &Url,
        name: &str,
        request: &WebhookRequest,
    ) -> Result<(), ClientError> {
        self.client(source).upsert_webhook(name, request).await
    }

    async fn unregister(&self, source: &Url, name: &str) -> Result<(), ClientError> {
        self.client(source).delete_webhook(name).await
    }

    async fn latest(&self, source: &Url) -> Result<Option<ContentKey>, ClientError> {
        let Some(channel) = channel_name_from_url(source) else {
            return Ok(None);
        };
        let latest = self.client(source).latest(channel).await?;
        Ok(latest.as_deref().and_then(ContentKey::from_url))
    }

    async fn fetch(&self, uri: &Url) -> Result<FetchedItem, ClientError> {
        self.client(uri).fetch(uri).await
    }
}
