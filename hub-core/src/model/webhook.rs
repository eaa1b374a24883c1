use super::ContentKey;
use hub_sdk::objects::{BatchMode, WebhookRequest};
use serde::{Deserialize, Serialize};
use url::Url;

/// A cluster-wide subscription: deliver new items of `channel_url` to
/// `callback_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub name: String,
    pub channel_url: Url,
    pub callback_url: Url,
    /// Explicit resume point. Only meaningful on the upsert that carries it.
    #[serde(default)]
    pub starting_key: Option<ContentKey>,
    #[serde(default)]
    pub batch: BatchMode,
    /// Delivery attempts per item before it is skipped. `0` retries forever.
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Webhook {
    pub fn new(name: impl Into<String>, channel_url: Url, callback_url: Url) -> Self {
        Self {
            name: name.into(),
            channel_url,
            callback_url,
            starting_key: None,
            batch: BatchMode::Single,
            max_attempts: 0,
            secret: None,
        }
    }

    /// Build from an API request. An unparseable starting key is kept as
    /// an error for the validator to report.
    pub fn from_request(name: &str, request: WebhookRequest) -> Result<Self, String> {
        let starting_key = match request.starting_key {
            None => None,
            Some(raw) => {
                let key = raw.trim_start_matches('/');
                let key = ContentKey::from_url(key)
                    .ok_or_else(|| format!("invalid starting key: {raw}"))?;
                Some(key)
            }
        };
        Ok(Self {
            name: name.to_owned(),
            channel_url: request.channel_url,
            callback_url: request.callback_url,
            starting_key,
            batch: request.batch,
            max_attempts: request.max_attempts.unwrap_or(0),
            secret: request.secret,
        })
    }

    pub fn with_starting_key(mut self, key: ContentKey) -> Self {
        self.starting_key = Some(key);
        self
    }

    pub fn with_batch(mut self, batch: BatchMode) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Normalize fields that have several equivalent spellings.
    pub fn with_defaults(mut self) -> Self {
        let path = self.channel_url.path().trim_end_matches('/').to_owned();
        self.channel_url.set_path(&path);
        self.channel_url.set_query(None);
        self.channel_url.set_fragment(None);
        if self.secret.as_deref().is_some_and(str::is_empty) {
            self.secret = None;
        }
        self
    }

    /// Equality of everything except the one-shot starting key.
    pub fn same_definition(&self, other: &Webhook) -> bool {
        self.name == other.name
            && self.channel_url == other.channel_url
            && self.callback_url == other.callback_url
            && self.batch == other.batch
            && self.max_attempts == other.max_attempts
            && self.secret == other.secret
    }

    /// The channel URL is fixed for the lifetime of a webhook.
    pub fn allowed_to_change(&self, existing: &Webhook) -> bool {
        self.channel_url == existing.channel_url
    }

    /// Channel name from a `.../channel/{name}` URL.
    pub fn channel_name(&self) -> Option<&str> {
        channel_name_from_url(&self.channel_url)
    }
}

pub fn channel_name_from_url(url: &Url) -> Option<&str> {
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    loop {
        if segments.next()? == "channel" {
            let name = segments.next()?;
            return segments.next().is_none().then_some(name);
        }
    }
}
