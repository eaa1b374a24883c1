use super::{Content, ContentStore, ListRequest, Listing, StorageError, channel_prefix, object_name};
use crate::entities::content_objects::{
    DeleteContentObject, DeleteContentObjectsBefore, GetContentObject, ListContentObjectNames,
    PutContentObject,
};
use crate::framework::DatabaseProcessor;
use crate::model::ContentKey;
use async_trait::async_trait;
use bytes::Bytes;
use kanau::processor::Processor;
use sqlx::PgPool;

/// Content objects in the `content_objects` table.
#[derive(Debug, Clone)]
pub struct PgContentStore {
    db: DatabaseProcessor,
    max_page_size: usize,
}

impl PgContentStore {
    pub fn new(pool: PgPool, max_page_size: usize) -> Self {
        Self {
            db: DatabaseProcessor { pool },
            max_page_size: max_page_size.max(1),
        }
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn put(
        &self,
        channel: &str,
        key: &ContentKey,
        content: Content,
    ) -> Result<ContentKey, StorageError> {
        self.db
            .process(PutContentObject {
                name: object_name(channel, key),
                content_type: content.content_type,
                data: content.data.to_vec(),
            })
            .await?;
        Ok(key.clone())
    }

    async fn get(&self, channel: &str, key: &ContentKey) -> Result<Option<Content>, StorageError> {
        let row = self
            .db
            .process(GetContentObject {
                name: object_name(channel, key),
            })
            .await?;
        Ok(row.map(|r| Content {
            content_type: r.content_type,
            data: Bytes::from(r.data),
        }))
    }

    async fn list(&self, request: ListRequest) -> Result<Listing, StorageError> {
        let page_size = request.max_keys.clamp(1, self.max_page_size);
        // One extra row tells whether the listing is truncated.
        let mut entries = self
            .db
            .process(ListContentObjectNames {
                prefix: request.prefix,
                marker: request.marker,
                limit: i64::try_from(page_size + 1).unwrap_or(i64::MAX),
            })
            .await?;
        let truncated = entries.len() > page_size;
        entries.truncate(page_size);
        Ok(Listing { entries, truncated })
    }

    async fn delete(&self, channel: &str, key: &ContentKey) -> Result<(), StorageError> {
        self.db
            .process(DeleteContentObject {
                name: object_name(channel, key),
            })
            .await?;
        Ok(())
    }

    async fn delete_range(&self, channel: &str, before: &ContentKey) -> Result<u64, StorageError> {
        Ok(self
            .db
            .process(DeleteContentObjectsBefore {
                prefix: channel_prefix(channel),
                before: object_name(channel, before),
            })
            .await?)
    }
}
