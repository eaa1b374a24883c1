//! Local change notification.
//!
//! A [`Watchers`] handle is shared by the code that mutates some set of
//! definitions (channels, webhooks) and the processors that must
//! re-evaluate which jobs to run. Notifications carry no payload: a
//! watcher reacts by re-reading the persisted state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

#[derive(Clone)]
pub struct Watchers {
    inner: Arc<WatchersInner>,
}

struct WatchersInner {
    version: AtomicU64,
    version_tx: watch::Sender<u64>,
}

/// Receives notifications from a [`Watchers`] handle.
pub struct ChangeWatcher {
    version_rx: watch::Receiver<u64>,
}

impl Watchers {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(WatchersInner {
                version: AtomicU64::new(0),
                version_tx,
            }),
        }
    }

    /// Wake every watcher. Notifications that arrive while a watcher is
    /// busy are coalesced into one.
    pub fn notify(&self) {
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.version_tx.send_replace(version);
    }

    pub fn subscribe(&self) -> ChangeWatcher {
        ChangeWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }
}

impl Default for Watchers {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeWatcher {
    /// Wait for the next notification. Errors once every [`Watchers`]
    /// handle is dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}
