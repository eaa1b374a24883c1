//! Persisted "last processed position" of background jobs.

use super::coordinator::{CoordinationError, Coordinator, join_path};
use crate::error::HubError;
use crate::model::ContentKey;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which family of jobs a cursor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    /// Last item delivered by a webhook.
    WebhookLastCompleted,
    /// Last item written by the replication receiver.
    ReplicationLastUpdated,
}

impl CursorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CursorKind::WebhookLastCompleted => "GroupLastCompleted",
            CursorKind::ReplicationLastUpdated => "ReplicatedLastUpdated",
        }
    }

    fn root(self) -> String {
        format!("/{}", self.as_str())
    }
}

impl std::fmt::Display for CursorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to seed a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorStart {
    /// Use this key only if the cursor does not exist yet.
    Default(ContentKey),
    /// Re-point the cursor to this key, replacing any existing value.
    Resume(ContentKey),
}

/// Storage of job cursors.
///
/// `update` does not check monotonicity. A cursor only moves forward
/// because its single writer, the job's current leader, only ever
/// passes a key after the one it read.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn initialize(
        &self,
        name: &str,
        kind: CursorKind,
        start: CursorStart,
    ) -> Result<(), HubError>;

    async fn get_or_null(&self, name: &str, kind: CursorKind)
    -> Result<Option<ContentKey>, HubError>;

    async fn update(&self, name: &str, kind: CursorKind, key: &ContentKey) -> Result<(), HubError>;

    async fn delete(&self, name: &str, kind: CursorKind) -> Result<(), HubError>;
}

/// Cursor store kept in the coordination service, one node per job.
pub struct LastContentPath {
    coordinator: Arc<dyn Coordinator>,
}

impl LastContentPath {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }

    fn path(name: &str, kind: CursorKind) -> String {
        join_path(&kind.root(), name)
    }
}

#[async_trait]
impl CursorStore for LastContentPath {
    async fn initialize(
        &self,
        name: &str,
        kind: CursorKind,
        start: CursorStart,
    ) -> Result<(), HubError> {
        let path = Self::path(name, kind);
        match start {
            CursorStart::Default(key) => {
                let created = self
                    .coordinator
                    .create_if_absent(&path, key.to_url().into_bytes())
                    .await?;
                debug!(%name, %kind, %key, created, "Initialized cursor");
            }
            CursorStart::Resume(key) => {
                self.coordinator
                    .set_data(&path, key.to_url().into_bytes())
                    .await?;
                debug!(%name, %kind, %key, "Re-pointed cursor");
            }
        }
        Ok(())
    }

    async fn get_or_null(
        &self,
        name: &str,
        kind: CursorKind,
    ) -> Result<Option<ContentKey>, HubError> {
        let Some(data) = self.coordinator.get_data(&Self::path(name, kind)).await? else {
            return Ok(None);
        };
        let key = std::str::from_utf8(&data).ok().and_then(ContentKey::from_url);
        if key.is_none() {
            warn!(%name, %kind, "Stored cursor is not a content key");
        }
        Ok(key)
    }

    async fn update(&self, name: &str, kind: CursorKind, key: &ContentKey) -> Result<(), HubError> {
        self.coordinator
            .set_data(&Self::path(name, kind), key.to_url().into_bytes())
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str, kind: CursorKind) -> Result<(), HubError> {
        match self.coordinator.delete(&Self::path(name, kind)).await {
            Ok(()) | Err(CoordinationError::NoNode(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::InMemoryCoordinator;
    use time::macros::datetime;

    fn key(seq: &str) -> ContentKey {
        ContentKey::new(datetime!(2024-02-03 04:05:06 UTC), seq)
    }

    #[tokio::test]
    async fn test_default_only_sets_absent_cursor() {
        let cursors = LastContentPath::new(Arc::new(InMemoryCoordinator::new().session()));
        let kind = CursorKind::WebhookLastCompleted;
        assert_eq!(cursors.get_or_null("w", kind).await.unwrap(), None);

        cursors.initialize("w", kind, CursorStart::Default(key("a"))).await.unwrap();
        cursors.initialize("w", kind, CursorStart::Default(key("b"))).await.unwrap();
        assert_eq!(cursors.get_or_null("w", kind).await.unwrap(), Some(key("a")));

        cursors.initialize("w", kind, CursorStart::Resume(key("0"))).await.unwrap();
        assert_eq!(cursors.get_or_null("w", kind).await.unwrap(), Some(key("0")));
    }

    #[tokio::test]
    async fn test_kinds_are_separate_namespaces() {
        let cursors = LastContentPath::new(Arc::new(InMemoryCoordinator::new().session()));
        cursors
            .update("x", CursorKind::WebhookLastCompleted, &key("a"))
            .await
            .unwrap();
        assert_eq!(
            cursors
                .get_or_null("x", CursorKind::ReplicationLastUpdated)
                .await
                .unwrap(),
            None
        );
        cursors.delete("x", CursorKind::WebhookLastCompleted).await.unwrap();
        cursors.delete("x", CursorKind::WebhookLastCompleted).await.unwrap();
        assert_eq!(
            cursors
                .get_or_null("x", CursorKind::WebhookLastCompleted)
                .await
                .unwrap(),
            None
        );
    }
}
