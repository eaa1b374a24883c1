//! Persistence of webhook definitions.

use crate::cluster::coordinator::{CoordinationError, Coordinator, join_path};
use crate::error::HubError;
use crate::model::Webhook;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

const WEBHOOKS_ROOT: &str = "/webhooks";

#[async_trait]
pub trait WebhookDao: Send + Sync {
    async fn upsert(&self, webhook: &Webhook) -> Result<(), HubError>;

    async fn get(&self, name: &str) -> Result<Option<Webhook>, HubError>;

    async fn get_all(&self) -> Result<Vec<Webhook>, HubError>;

    async fn delete(&self, name: &str) -> Result<(), HubError>;
}

/// Webhooks stored as JSON documents under `/webhooks/{name}`.
pub struct CoordinatorWebhookDao {
    coordinator: Arc<dyn Coordinator>,
}

impl CoordinatorWebhookDao {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl WebhookDao for CoordinatorWebhookDao {
    async fn upsert(&self, webhook: &Webhook) -> Result<(), HubError> {
        let json = serde_json::to_vec(webhook)?;
        self.coordinator
            .set_data(&join_path(WEBHOOKS_ROOT, &webhook.name), json)
            .await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Webhook>, HubError> {
        match self.coordinator.get_data(&join_path(WEBHOOKS_ROOT, name)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<Vec<Webhook>, HubError> {
        let mut names = self.coordinator.get_children(WEBHOOKS_ROOT).await?;
        names.sort();
        let mut webhooks = Vec::with_capacity(names.len());
        for name in names {
            match self.get(&name).await {
                Ok(Some(webhook)) => webhooks.push(webhook),
                Ok(None) => {}
                Err(e) => warn!(webhook = %name, error = %e, "Skipping unreadable webhook"),
            }
        }
        Ok(webhooks)
    }

    async fn delete(&self, name: &str) -> Result<(), HubError> {
        match self.coordinator.delete(&join_path(WEBHOOKS_ROOT, name)).await {
            Ok(()) | Err(CoordinationError::NoNode(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
