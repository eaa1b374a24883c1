//! Webhook definitions and delivery payloads.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::signature::Signature;

/// How many items a webhook receives per callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// One item per callback; the cursor advances after every item.
    #[default]
    Single,
    /// Every item found by one poll goes out in a single callback.
    Batch,
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchMode::Single => write!(f, "single"),
            BatchMode::Batch => write!(f, "batch"),
        }
    }
}

/// Body of `PUT /webhook/{name}`.
///
/// `starting_key` is the encoded content key to resume after. Supplying it
/// on an existing webhook re-points the webhook's cursor (replay).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub channel_url: Url,
    pub callback_url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_key: Option<String>,
    #[serde(default)]
    pub batch: BatchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Item,
}

/// What a webhook callback receives: the URIs of new items, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub name: String,
    pub uris: Vec<String>,
    #[serde(rename = "type")]
    pub kind: PayloadKind,
}

impl WebhookPayload {
    pub fn items(name: impl Into<String>, uris: Vec<String>) -> Self {
        Self {
            name: name.into(),
            uris,
            kind: PayloadKind::Item,
        }
    }
}

impl Signature for WebhookPayload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_format() {
        let payload = WebhookPayload::items(
            "Repl_hub_dev_UHF",
            vec!["http://hub/channel/UHF/2024/01/02/03/04/05/678/abcdef".to_string()],
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "item");
        assert_eq!(json["name"], "Repl_hub_dev_UHF");
        assert_eq!(json["uris"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_request_defaults() {
        let request: WebhookRequest = serde_json::from_str(
            r#"{"channel_url": "http://hub/channel/UHF", "callback_url": "http://client/cb"}"#,
        )
        .unwrap();
        assert_eq!(request.batch, BatchMode::Single);
        assert!(request.starting_key.is_none());
        assert!(request.max_attempts.is_none());
    }
}
