//! Content storage.
//!
//! The backing store is a flat, listing-only object store: objects are
//! named `{channel}/{encoded-key}` and can only be enumerated in
//! ascending name order by prefix and exclusive marker, one bounded page
//! at a time. Everything above that (ordering, bounding, TTL filtering)
//! lives in [`query`].

pub mod memory;
pub mod postgres;
pub mod query;

pub use memory::InMemoryContentStore;
pub use postgres::PgContentStore;
pub use query::{BoundedKeySet, ContentQueries, KeyPager};

use crate::model::ContentKey;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The store did not answer in time. Worth one immediate retry.
    #[error("storage timeout: {0}")]
    Timeout(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Timeout(_))
    }
}

/// One stored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Content {
    pub fn new(content_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: String,
    /// Only names strictly greater than the marker are listed.
    pub marker: Option<String>,
    pub max_keys: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Object names in ascending order.
    pub entries: Vec<String>,
    /// More names match the prefix after the last entry.
    pub truncated: bool,
}

impl Listing {
    pub fn next_marker(&self) -> Option<&str> {
        if self.truncated {
            self.entries.last().map(String::as_str)
        } else {
            None
        }
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(
        &self,
        channel: &str,
        key: &ContentKey,
        content: Content,
    ) -> Result<ContentKey, StorageError>;

    async fn get(&self, channel: &str, key: &ContentKey) -> Result<Option<Content>, StorageError>;

    async fn list(&self, request: ListRequest) -> Result<Listing, StorageError>;

    async fn delete(&self, channel: &str, key: &ContentKey) -> Result<(), StorageError>;

    /// Remove every item of `channel` whose key is strictly before `before`.
    async fn delete_range(&self, channel: &str, before: &ContentKey) -> Result<u64, StorageError>;
}

pub fn object_name(channel: &str, key: &ContentKey) -> String {
    format!("{channel}/{}", key.to_url())
}

pub fn channel_prefix(channel: &str) -> String {
    format!("{channel}/")
}

/// Decode a listed object name back into a key of `channel`.
pub fn parse_object_name(channel: &str, name: &str) -> Option<ContentKey> {
    let rest = name.strip_prefix(channel)?.strip_prefix('/')?;
    ContentKey::from_url(rest)
}

/// List once, retrying a single time on a transient failure.
pub async fn list_with_retry(
    store: &dyn ContentStore,
    request: ListRequest,
) -> Result<Listing, StorageError> {
    match store.list(request.clone()).await {
        Err(e) if e.is_transient() => {
            warn!(prefix = %request.prefix, error = %e, "Listing timed out, retrying once");
            store.list(request).await
        }
        other => other,
    }
}

/// Get once, retrying a single time on a transient failure.
pub async fn get_with_retry(
    store: &dyn ContentStore,
    channel: &str,
    key: &ContentKey,
) -> Result<Option<Content>, StorageError> {
    match store.get(channel, key).await {
        Err(e) if e.is_transient() => {
            warn!(%channel, %key, error = %e, "Get timed out, retrying once");
            store.get(channel, key).await
        }
        other => other,
    }
}
