use crate::channel::ChannelConfigDao;
use crate::cluster::{CursorKind, CursorStart, CursorStore};
use crate::entities::channel_configs::{
    DeleteChannelConfig, GetAllChannelConfigs, GetChannelConfig, UpsertChannelConfig,
};
use crate::entities::cursors::{DeleteCursor, GetCursor, InsertCursorIfAbsent, UpsertCursor};
use crate::entities::webhooks::{DeleteWebhook, GetAllWebhooks, GetWebhook, UpsertWebhook};
use crate::error::HubError;
use crate::framework::DatabaseProcessor;
use crate::model::{ChannelConfig, ContentKey, Webhook, channel_key};
use crate::webhook::WebhookDao;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use tracing::{debug, warn};

/// Channel configs, webhooks and cursors in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStateStore {
    db: DatabaseProcessor,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl ChannelConfigDao for PgStateStore {
    async fn upsert(&self, config: &ChannelConfig) -> Result<(), HubError> {
        self.db
            .process(UpsertChannelConfig {
                name: channel_key(&config.name),
                config: config.clone(),
            })
            .await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<ChannelConfig>, HubError> {
        Ok(self
            .db
            .process(GetChannelConfig {
                name: channel_key(name),
            })
            .await?)
    }

    async fn get_all(&self) -> Result<Vec<ChannelConfig>, HubError> {
        Ok(self.db.process(GetAllChannelConfigs).await?)
    }

    async fn delete(&self, name: &str) -> Result<(), HubError> {
        self.db
            .process(DeleteChannelConfig {
                name: channel_key(name),
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookDao for PgStateStore {
    async fn upsert(&self, webhook: &Webhook) -> Result<(), HubError> {
        self.db
            .process(UpsertWebhook {
                webhook: webhook.clone(),
            })
            .await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Webhook>, HubError> {
        Ok(self
            .db
            .process(GetWebhook {
                name: name.to_owned(),
            })
            .await?)
    }

    async fn get_all(&self) -> Result<Vec<Webhook>, HubError> {
        Ok(self.db.process(GetAllWebhooks).await?)
    }

    async fn delete(&self, name: &str) -> Result<(), HubError> {
        self.db
            .process(DeleteWebhook {
                name: name.to_owned(),
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for PgStateStore {
    async fn initialize(
        &self,
        name: &str,
        kind: CursorKind,
        start: CursorStart,
    ) -> Result<(), HubError> {
        match start {
            CursorStart::Default(key) => {
                let created = self
                    .db
                    .process(InsertCursorIfAbsent {
                        name: name.to_owned(),
                        kind: kind.as_str(),
                        content_key: key.to_url(),
                    })
                    .await?;
                debug!(%name, %kind, %key, created, "Initialized cursor");
            }
            CursorStart::Resume(key) => {
                self.update(name, kind, &key).await?;
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
        let stored = self
            .db
            .process(GetCursor {
                name: name.to_owned(),
                kind: kind.as_str(),
            })
            .await?;
        let Some(stored) = stored else {
            return Ok(None);
        };
        let key = ContentKey::from_url(&stored);
        if key.is_none() {
            warn!(%name, %kind, "Stored cursor is not a content key");
        }
        Ok(key)
    }

    async fn update(&self, name: &str, kind: CursorKind, key: &ContentKey) -> Result<(), HubError> {
        self.db
            .process(UpsertCursor {
                name: name.to_owned(),
                kind: kind.as_str(),
                content_key: key.to_url(),
            })
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str, kind: CursorKind) -> Result<(), HubError> {
        self.db
            .process(DeleteCursor {
                name: name.to_owned(),
                kind: kind.as_str(),
            })
            .await?;
        Ok(())
    }
}
