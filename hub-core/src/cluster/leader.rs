//! Cluster-wide leader election for named jobs.
//!
//! Every candidacy creates an ephemeral sequential node under the job
//! path. The candidacy owning the lowest-sequence live node leads and runs
//! the job's [`Leader`] worker with a [`Leadership`] handle; everyone else
//! waits for the children of the job path to change. Leadership ends when
//! the worker returns, when the election is closed, or when the session
//! is suspended or lost. The node is always released before the candidacy
//! re-enters the queue.
//!
//! ```text
//! Candidate --(lowest node)--> Leading --(worker returns | session lost)--> Candidate
//!     \                           \
//!      `--(close)--> Stopped       `--(close)--> Stopped
//! ```

use super::coordinator::{CoordinationError, Coordinator, SessionState, join_path};
use crate::config::ElectionSettings;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NODE_PREFIX: &str = "lock-";

/// Handed to a worker for the duration of one term of leadership.
#[derive(Debug, Clone)]
pub struct Leadership {
    path: String,
    token: CancellationToken,
}

impl Leadership {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// False as soon as the worker must stop.
    pub fn has_leadership(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Resolves when leadership is revoked.
    pub async fn lost(&self) {
        self.token.cancelled().await
    }

    /// Sleep unless leadership is revoked first. Returns whether
    /// leadership is still held.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// A handle that is never revoked, for driving a worker directly.
    pub fn detached(path: impl Into<String>) -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        (
            Self {
                path: path.into(),
                token: token.clone(),
            },
            token,
        )
    }
}

/// A job that runs while its process holds leadership.
///
/// Workers may be invoked again after a previous term ends and must
/// return promptly once [`Leadership::has_leadership`] turns false.
/// Returning an error relinquishes leadership and delays the next
/// candidacy by the error backoff.
#[async_trait]
pub trait Leader: Send + Sync + 'static {
    async fn take_leadership(&self, leadership: &Leadership) -> anyhow::Result<()>;
}

struct Shared {
    path: String,
    coordinator: Arc<dyn Coordinator>,
    leader: Arc<dyn Leader>,
    settings: ElectionSettings,
    leading: AtomicUsize,
}

/// Candidacies of this process for one job path.
///
/// Each call to [`start`](LeaderElection::start) launches an independent
/// candidacy, so a single election can hold several places in the queue.
/// Callers wanting exactly one candidacy call `start` once.
pub struct LeaderElection {
    shared: Arc<Shared>,
    root: CancellationToken,
    candidacies: Mutex<Vec<JoinHandle<()>>>,
}

impl LeaderElection {
    pub fn new(
        path: impl Into<String>,
        coordinator: Arc<dyn Coordinator>,
        leader: Arc<dyn Leader>,
        settings: ElectionSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                coordinator,
                leader,
                settings,
                leading: AtomicUsize::new(0),
            }),
            root: CancellationToken::new(),
            candidacies: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.shared.path
    }

    /// Launch a candidacy.
    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let cancel = self.root.child_token();
        let handle = tokio::spawn(run_candidacy(shared, cancel));
        let mut candidacies = self.candidacies.lock().unwrap_or_else(|e| e.into_inner());
        candidacies.retain(|h| !h.is_finished());
        candidacies.push(handle);
        debug!(path = %self.shared.path, count = candidacies.len(), "Started candidacy");
    }

    /// Whether one of this election's candidacies currently leads.
    pub fn is_leading(&self) -> bool {
        self.shared.leading.load(Ordering::SeqCst) > 0
    }

    pub fn candidacy_count(&self) -> usize {
        self.candidacies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Relinquish every candidacy, revoking leadership if held, and wait
    /// for workers to return and nodes to be released.
    pub async fn close(&self) {
        self.root.cancel();
        let handles: Vec<JoinHandle<()>> = self
            .candidacies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(path = %self.shared.path, error = %e, "Candidacy task failed");
            }
        }
        info!(path = %self.shared.path, "Leader election closed");
    }
}

impl Drop for LeaderElection {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn run_candidacy(shared: Arc<Shared>, cancel: CancellationToken) {
    while !cancel.is_cancelled() {
        let pause = match acquire(&shared, &cancel).await {
            Ok(Some(node)) => {
                let outcome = lead(&shared, &cancel).await;
                release(&shared, &node).await;
                match outcome {
                    Ok(()) => {
                        debug!(path = %shared.path, "Leadership relinquished");
                        shared.settings.requeue_delay
                    }
                    Err(e) => {
                        warn!(path = %shared.path, error = %e, "Leader worker failed");
                        shared.settings.error_backoff
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(path = %shared.path, error = %e, "Leader election attempt failed");
                shared.settings.error_backoff
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    debug!(path = %shared.path, "Candidacy stopped");
}

/// Queue for leadership. Returns the owned node once it is the lowest, or
/// `None` if cancelled first.
async fn acquire(
    shared: &Shared,
    cancel: &CancellationToken,
) -> Result<Option<String>, CoordinationError> {
    let node = shared
        .coordinator
        .create_ephemeral_sequential(&shared.path, NODE_PREFIX)
        .await?;
    match wait_until_lowest(shared, cancel, &node).await {
        Ok(true) => Ok(Some(node)),
        Ok(false) => {
            release(shared, &node).await;
            Ok(None)
        }
        Err(e) => {
            release(shared, &node).await;
            Err(e)
        }
    }
}

async fn wait_until_lowest(
    shared: &Shared,
    cancel: &CancellationToken,
    node: &str,
) -> Result<bool, CoordinationError> {
    let name = node.rsplit('/').next().unwrap_or(node);
    loop {
        // Subscribe before listing so no change can slip in between.
        let mut children_rx = shared.coordinator.watch_children(&shared.path);
        let mut session_rx = shared.coordinator.session_state();
        if *session_rx.borrow_and_update() != SessionState::Connected {
            return Err(CoordinationError::SessionLost);
        }

        let mut children = shared.coordinator.get_children(&shared.path).await?;
        children.retain(|c| c.starts_with(NODE_PREFIX));
        children.sort();
        match children.first() {
            Some(lowest) if lowest == name => return Ok(true),
            _ if !children.iter().any(|c| c == name) => {
                return Err(CoordinationError::NoNode(node.to_owned()));
            }
            _ => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            changed = children_rx.changed() => {
                if changed.is_err() {
                    return Err(CoordinationError::Unavailable("children watch closed".to_owned()));
                }
            }
            _ = session_rx.changed() => {}
        }
    }
}

/// Run the worker for one term. The term is revoked on cancellation or
/// when the session stops being connected.
async fn lead(shared: &Shared, cancel: &CancellationToken) -> anyhow::Result<()> {
    let token = cancel.child_token();
    let leadership = Leadership {
        path: shared.path.clone(),
        token: token.clone(),
    };
    let mut session_rx = shared.coordinator.session_state();
    let leader = Arc::clone(&shared.leader);

    info!(path = %shared.path, "Took leadership");
    shared.leading.fetch_add(1, Ordering::SeqCst);
    let mut worker = tokio::spawn(async move { leader.take_leadership(&leadership).await });

    let joined = tokio::select! {
        joined = &mut worker => joined,
        _ = session_interrupted(&mut session_rx) => {
            warn!(path = %shared.path, "Coordination session interrupted, revoking leadership");
            token.cancel();
            (&mut worker).await
        }
    };
    token.cancel();
    shared.leading.fetch_sub(1, Ordering::SeqCst);
    info!(path = %shared.path, "Leadership ended");

    match joined {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("leader worker panicked or was aborted: {e}")),
    }
}

async fn session_interrupted(session_rx: &mut watch::Receiver<SessionState>) {
    loop {
        if *session_rx.borrow_and_update() != SessionState::Connected {
            return;
        }
        if session_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn release(shared: &Shared, node: &str) {
    match shared.coordinator.delete(node).await {
        Ok(()) | Err(CoordinationError::NoNode(_)) | Err(CoordinationError::SessionLost) => {}
        Err(e) => warn!(path = %shared.path, %node, error = %e, "Failed to release leader node"),
    }
}

/// Path of the election for job `name` of a given kind.
pub fn election_path(kind: &str, name: &str) -> String {
    join_path(&format!("/leaders/{kind}"), name)
}
