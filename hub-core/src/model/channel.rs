use hub_sdk::objects::ChannelRequest;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// Default retention for channels created without an explicit TTL.
pub const DEFAULT_TTL_DAYS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Retention in days; `0` keeps content forever.
    pub ttl_days: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub replication_source: Option<Url>,
    #[serde(default)]
    pub global_master: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_date: OffsetDateTime,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, creation_date: OffsetDateTime) -> Self {
        Self {
            name: name.into(),
            ttl_days: DEFAULT_TTL_DAYS,
            description: String::new(),
            tags: Vec::new(),
            replication_source: None,
            global_master: false,
            creation_date,
        }
    }

    pub fn from_request(
        name: &str,
        request: ChannelRequest,
        creation_date: OffsetDateTime,
    ) -> Self {
        Self {
            name: name.to_owned(),
            ttl_days: request.ttl_days.unwrap_or(DEFAULT_TTL_DAYS),
            description: request.description.unwrap_or_default(),
            tags: request.tags,
            replication_source: request.replication_source,
            global_master: request.global_master,
            creation_date,
        }
    }

    pub fn with_ttl_days(mut self, ttl_days: u32) -> Self {
        self.ttl_days = ttl_days;
        self
    }

    pub fn with_replication_source(mut self, source: Url) -> Self {
        self.replication_source = Some(source);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Case-normalized identity used for storage and lookups.
    pub fn key(&self) -> String {
        channel_key(&self.name)
    }

    pub fn is_replicating(&self) -> bool {
        self.replication_source.is_some()
    }

    /// Whether this channel needs a replication-manager reaction.
    pub fn is_replication_relevant(&self) -> bool {
        self.is_replicating() || self.global_master
    }

    /// True when any user-visible field differs from `other`.
    pub fn has_changed(&self, other: Option<&ChannelConfig>) -> bool {
        match other {
            None => true,
            Some(other) => {
                self.ttl_days != other.ttl_days
                    || self.description != other.description
                    || self.tags != other.tags
                    || self.replication_source != other.replication_source
                    || self.global_master != other.global_master
            }
        }
    }
}

/// Channel names are case-insensitive.
pub fn channel_key(name: &str) -> String {
    name.to_ascii_lowercase()
}
