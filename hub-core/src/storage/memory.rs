//! In-process content store.
//!
//! Honours the listing contract of a remote object store (ascending
//! names, exclusive marker, bounded pages, `truncated` flag) so the query
//! engine behaves the same against it. Transient timeouts can be injected.

use super::{
    Content, ContentStore, ListRequest, Listing, StorageError, channel_prefix, object_name,
    parse_object_name,
};
use crate::model::ContentKey;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

pub struct InMemoryContentStore {
    objects: RwLock<BTreeMap<String, Content>>,
    page_size: usize,
    list_failures: AtomicUsize,
    get_failures: AtomicUsize,
    list_calls: AtomicUsize,
}

impl InMemoryContentStore {
    /// `page_size` caps every listing page regardless of the requested size.
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            list_failures: AtomicUsize::new(0),
            get_failures: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` list calls fail with a timeout.
    pub fn fail_next_lists(&self, n: usize) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` get calls fail with a timeout.
    pub fn fail_next_gets(&self, n: usize) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    /// Number of list calls served so far, failed ones included.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Store a raw object name that is not a content key.
    pub async fn put_raw(&self, name: impl Into<String>, content: Content) {
        self.objects.write().await.insert(name.into(), content);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(
        &self,
        channel: &str,
        key: &ContentKey,
        content: Content,
    ) -> Result<ContentKey, StorageError> {
        self.objects
            .write()
            .await
            .insert(object_name(channel, key), content);
        Ok(key.clone())
    }

    async fn get(&self, channel: &str, key: &ContentKey) -> Result<Option<Content>, StorageError> {
        if Self::take_failure(&self.get_failures) {
            return Err(StorageError::Timeout(format!("get {channel}/{key}")));
        }
        Ok(self.objects.read().await.get(&object_name(channel, key)).cloned())
    }

    async fn list(&self, request: ListRequest) -> Result<Listing, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.list_failures) {
            return Err(StorageError::Timeout(format!("list {}", request.prefix)));
        }

        let max = request.max_keys.clamp(1, self.page_size);
        let lower = match &request.marker {
            Some(marker) if *marker >= request.prefix => Bound::Excluded(marker.clone()),
            _ => Bound::Included(request.prefix.clone()),
        };
        let objects = self.objects.read().await;
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(&request.prefix));

        let entries: Vec<String> = matching.by_ref().take(max).cloned().collect();
        let truncated = matching.next().is_some();
        Ok(Listing { entries, truncated })
    }

    async fn delete(&self, channel: &str, key: &ContentKey) -> Result<(), StorageError> {
        self.objects.write().await.remove(&object_name(channel, key));
        Ok(())
    }

    async fn delete_range(&self, channel: &str, before: &ContentKey) -> Result<u64, StorageError> {
        let prefix = channel_prefix(channel);
        let mut objects = self.objects.write().await;
        let doomed: Vec<String> = objects
            .range(prefix.clone()..)
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(&prefix))
            .filter(|name| parse_object_name(channel, name).is_some_and(|key| key < *before))
            .cloned()
            .collect();
        for name in &doomed {
            objects.remove(name);
        }
        Ok(doomed.len() as u64)
    }
}
