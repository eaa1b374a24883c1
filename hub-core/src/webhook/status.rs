use crate::model::ContentKey;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_RECENT_ERRORS: usize = 10;

/// Live delivery state of one webhook in this process.
#[derive(Debug, Default)]
pub struct DeliveryState {
    inner: Mutex<DeliveryStateInner>,
}

#[derive(Debug, Default)]
struct DeliveryStateInner {
    in_flight: Vec<ContentKey>,
    errors: VecDeque<String>,
}

impl DeliveryState {
    fn lock(&self) -> std::sync::MutexGuard<'_, DeliveryStateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_in_flight(&self, keys: &[ContentKey]) {
        self.lock().in_flight = keys.to_vec();
    }

    pub fn clear_in_flight(&self) {
        self.lock().in_flight.clear();
    }

    pub fn record_error(&self, message: String) {
        let mut inner = self.lock();
        if inner.errors.len() == MAX_RECENT_ERRORS {
            inner.errors.pop_front();
        }
        inner.errors.push_back(message);
    }

    pub fn in_flight(&self) -> Vec<ContentKey> {
        self.lock().in_flight.clone()
    }

    /// Most recent errors, oldest first.
    pub fn errors(&self) -> Vec<String> {
        self.lock().errors.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookStatus {
    pub name: String,
    /// Latest stable key of the webhook's channel.
    pub channel_latest: Option<ContentKey>,
    /// The webhook's cursor.
    pub last_completed: Option<ContentKey>,
    /// Whether this process currently leads delivery.
    pub leading: bool,
    pub in_flight: Vec<ContentKey>,
    pub errors: Vec<String>,
}
