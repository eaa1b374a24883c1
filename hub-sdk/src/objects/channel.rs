//! Channel request and response bodies.

use serde::{Deserialize, Serialize};
use url::Url;

/// Body of `PUT /channel/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    #[serde(default)]
    pub ttl_days: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub replication_source: Option<Url>,
    #[serde(default)]
    pub global_master: bool,
}

/// Returned after an item is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedContent {
    pub key: String,
    pub uri: String,
}

/// Returned by `GET /channel/{name}/latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestKey {
    pub key: String,
}
