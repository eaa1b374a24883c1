//! Persistence of channel configurations.

use crate::cluster::coordinator::{CoordinationError, Coordinator, join_path};
use crate::error::HubError;
use crate::model::{ChannelConfig, channel_key};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

const CHANNELS_ROOT: &str = "/channels";

/// Channel configs keyed by case-normalized name.
#[async_trait]
pub trait ChannelConfigDao: Send + Sync {
    async fn upsert(&self, config: &ChannelConfig) -> Result<(), HubError>;

    async fn get(&self, name: &str) -> Result<Option<ChannelConfig>, HubError>;

    async fn get_all(&self) -> Result<Vec<ChannelConfig>, HubError>;

    async fn delete(&self, name: &str) -> Result<(), HubError>;

    async fn exists(&self, name: &str) -> Result<bool, HubError> {
        Ok(self.get(name).await?.is_some())
    }
}

/// Channel configs stored as JSON documents under `/channels/{name}`.
pub struct CoordinatorChannelConfigDao {
    coordinator: Arc<dyn Coordinator>,
}

impl CoordinatorChannelConfigDao {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self { coordinator }
    }

    fn path(name: &str) -> String {
        join_path(CHANNELS_ROOT, &channel_key(name))
    }
}

#[async_trait]
impl ChannelConfigDao for CoordinatorChannelConfigDao {
    async fn upsert(&self, config: &ChannelConfig) -> Result<(), HubError> {
        let json = serde_json::to_vec(config)?;
        self.coordinator.set_data(&Self::path(&config.name), json).await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ChannelConfig>, HubError> {
        match self.coordinator.get_data(&Self::path(name)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<Vec<ChannelConfig>, HubError> {
        let mut names = self.coordinator.get_children(CHANNELS_ROOT).await?;
        names.sort();
        let mut configs = Vec::with_capacity(names.len());
        for name in names {
            match self.get(&name).await {
                Ok(Some(config)) => configs.push(config),
                Ok(None) => {}
                Err(e) => warn!(channel = %name, error = %e, "Skipping unreadable channel config"),
            }
        }
        Ok(configs)
    }

    async fn delete(&self, name: &str) -> Result<(), HubError> {
        match self.coordinator.delete(&Self::path(name)).await {
            Ok(()) | Err(CoordinationError::NoNode(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
