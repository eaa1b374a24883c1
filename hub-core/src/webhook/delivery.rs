//! Sending webhook payloads to callbacks.

use crate::model::Webhook;
use async_trait::async_trait;
use hub_sdk::objects::WebhookPayload;
use hub_sdk::signature::{SIGNATURE_HEADER, SignedObject};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The callback answered with a non-2xx status.
    #[error("callback rejected delivery with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    async fn deliver(&self, webhook: &Webhook, payload: &WebhookPayload)
        -> Result<(), DeliveryError>;
}

/// Delivers payloads as JSON POSTs, signed when the webhook has a secret.
pub struct HttpDelivery {
    http_client: reqwest::Client,
}

impl HttpDelivery {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

/// JSON body and optional signature header for one delivery.
pub fn prepare_body(
    webhook: &Webhook,
    payload: &WebhookPayload,
) -> Result<(String, Option<String>), serde_json::Error> {
    match webhook.secret.as_deref() {
        Some(secret) => {
            let signed = SignedObject::new(payload.clone(), secret.as_bytes())?;
            let header = signed.to_header();
            Ok((signed.json, Some(header)))
        }
        None => Ok((serde_json::to_string(payload)?, None)),
    }
}

#[async_trait]
impl WebhookDelivery for HttpDelivery {
    async fn deliver(
        &self,
        webhook: &Webhook,
        payload: &WebhookPayload,
    ) -> Result<(), DeliveryError> {
        let (body, signature) = prepare_body(webhook, payload)?;
        let mut request = self
            .http_client
            .post(webhook.callback_url.clone())
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(webhook = %webhook.name, %status, items = payload.uris.len(), "Delivered");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Exponential backoff: `2^attempt` seconds, with the exponent capped.
pub fn calculate_retry_delay(attempt: u32, max_exponent: u32) -> Duration {
    let seconds = 2u64.pow(attempt.min(max_exponent));
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_sdk::signature::verify_webhook;
    use url::Url;

    #[test]
    fn test_retry_delay_calculation() {
        assert_eq!(calculate_retry_delay(0, 11), Duration::from_secs(1));
        assert_eq!(calculate_retry_delay(1, 11), Duration::from_secs(2));
        assert_eq!(calculate_retry_delay(10, 11), Duration::from_secs(1024));
        assert_eq!(calculate_retry_delay(11, 11), Duration::from_secs(2048));
        // Capped at the exponent limit.
        assert_eq!(calculate_retry_delay(12, 11), Duration::from_secs(2048));
        assert_eq!(calculate_retry_delay(100, 3), Duration::from_secs(8));
    }

    fn webhook() -> Webhook {
        Webhook::new(
            "w",
            Url::parse("http://hub/channel/a").unwrap(),
            Url::parse("http://cb/").unwrap(),
        )
    }

    #[test]
    fn test_unsigned_body() {
        let payload = WebhookPayload::items("w", vec!["http://hub/channel/a/x".into()]);
        let (body, header) = prepare_body(&webhook(), &payload).unwrap();
        assert!(header.is_none());
        assert_eq!(serde_json::from_str::<WebhookPayload>(&body).unwrap(), payload);
    }

    #[test]
    fn test_signed_body_verifies() {
        let mut hook = webhook();
        hook.secret = Some("s3cret".into());
        let payload = WebhookPayload::items("w", vec!["http://hub/channel/a/x".into()]);
        let (body, header) = prepare_body(&hook, &payload).unwrap();
        let verified: WebhookPayload = verify_webhook(&header.unwrap(), &body, b"s3cret").unwrap();
        assert_eq!(verified, payload);
    }
}
