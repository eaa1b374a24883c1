use super::receiver::key_from_item_uri;
use super::upstream::UpstreamHub;
use crate::model::ContentKey;
use async_trait::async_trait;
use bytes::Bytes;
use hub_sdk::client::{ClientError, FetchedItem};
use hub_sdk::objects::WebhookRequest;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// Records registrations; serves each item's key as its body.
#[derive(Default)]
pub struct MockUpstream {
    registrations: Mutex<BTreeMap<String, WebhookRequest>>,
    unregistered: Mutex<Vec<String>>,
    latest: Mutex<Option<ContentKey>>,
    registration_failures: AtomicUsize,
}

impl MockUpstream {
    pub fn registration(&self, name: &str) -> Option<WebhookRequest> {
        self.registrations.lock().unwrap().get(name).cloned()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.unregistered.lock().unwrap().clone()
    }

    pub fn set_latest(&self, key: ContentKey) {
        *self.latest.lock().unwrap() = Some(key);
    }

    pub fn fail_next_registrations(&self, n: usize) {
        self.registration_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamHub for MockUpstream {
    async fn register(
        &self,
        _: &Url,
        name: &str,
        request: &WebhookRequest,
    ) -> Result<(), ClientError> {
        let failed = self
            .registration_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ClientError::Api {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "down".into(),
            });
        }
        self.registrations
            .lock()
            .unwrap()
            .insert(name.to_owned(), request.clone());
        Ok(())
    }

    async fn unregister(&self, _: &Url, name: &str) -> Result<(), ClientError> {
        self.registrations.lock().unwrap().remove(name);
        self.unregistered.lock().unwrap().push(name.to_owned());
        Ok(())
    }

    async fn latest(&self, _: &Url) -> Result<Option<ContentKey>, ClientError> {
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn fetch(&self, uri: &Url) -> Result<FetchedItem, ClientError> {
        let key = key_from_item_uri(uri).map(|k| k.to_url()).unwrap_or_default();
        Ok(FetchedItem {
            data: Bytes::from(key),
            content_type: Some("text/plain".into()),
        })
    }
}
