//! Typed client for the parts of a hub's HTTP API that other hubs use.

use bytes::Bytes;
use reqwest::Client;
use url::Url;

use super::{ClientError, ensure_success, parse_response};
use crate::objects::{LatestKey, WebhookRequest};

/// An item fetched from a remote channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Client for one remote hub, rooted at `base_url`.
#[derive(Debug, Clone)]
pub struct HubClient {
    http: Client,
    base_url: Url,
}

impl HubClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` (timeouts, proxies).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `PUT /webhook/{name}` – create or update a webhook on the remote hub.
    pub async fn upsert_webhook(
        &self,
        name: &str,
        request: &WebhookRequest,
    ) -> Result<(), ClientError> {
        let url = self
            .base_url
            .join(&format!("/webhook/{}", urlencoding::encode(name)))?;
        let resp = self.http.put(url).json(request).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// `DELETE /webhook/{name}`. A webhook that is already gone is not an
    /// error.
    pub async fn delete_webhook(&self, name: &str) -> Result<(), ClientError> {
        let url = self
            .base_url
            .join(&format!("/webhook/{}", urlencoding::encode(name)))?;
        let resp = self.http.delete(url).send().await?;
        match ensure_success(resp).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// `GET /channel/{name}/latest?stable=true` – the encoded latest stable
    /// key, or `None` for an empty channel.
    pub async fn latest(&self, channel: &str) -> Result<Option<String>, ClientError> {
        let url = self.base_url.join(&format!(
            "/channel/{}/latest",
            urlencoding::encode(channel)
        ))?;
        let resp = self
            .http
            .get(url)
            .query(&[("stable", "true")])
            .send()
            .await?;
        match parse_response::<LatestKey>(resp).await {
            Ok(latest) => Ok(Some(latest.key)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch an item by its absolute URI, as found in webhook payloads.
    pub async fn fetch(&self, uri: &Url) -> Result<FetchedItem, ClientError> {
        let resp = self.http.get(uri.clone()).send().await?;
        let resp = ensure_success(resp).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let data = resp.bytes().await?;
        Ok(FetchedItem { data, content_type })
    }
}
