//! Contract of the external coordination service.
//!
//! A hierarchical namespace of small nodes, addressed by `/`-separated
//! paths, with ephemeral sequential children bound to a session, child
//! watches and session state reporting. Parents are created implicitly.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connected,
    /// Connection interrupted; the session may still come back.
    Suspended,
    /// The session expired and its ephemeral nodes are gone.
    Lost,
}

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("coordination session lost")]
    SessionLost,

    #[error("no such node: {0}")]
    NoNode(String),

    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid node path: {0}")]
    InvalidPath(String),
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Create `{parent}/{prefix}{sequence}` owned by this session and
    /// return its full path. Sequence numbers are zero-padded so names
    /// sort in creation order.
    async fn create_ephemeral_sequential(
        &self,
        parent: &str,
        prefix: &str,
    ) -> Result<String, CoordinationError>;

    /// Names (not paths) of the direct children of `parent`, unsorted.
    async fn get_children(&self, parent: &str) -> Result<Vec<String>, CoordinationError>;

    async fn delete(&self, path: &str) -> Result<(), CoordinationError>;

    async fn get_data(&self, path: &str) -> Result<Option<Vec<u8>>, CoordinationError>;

    /// Create or overwrite a persistent node.
    async fn set_data(&self, path: &str, data: Vec<u8>) -> Result<(), CoordinationError>;

    /// Create a persistent node unless it exists. Returns whether it was
    /// created.
    async fn create_if_absent(&self, path: &str, data: Vec<u8>) -> Result<bool, CoordinationError>;

    /// A receiver that changes whenever the children of `parent` change.
    fn watch_children(&self, parent: &str) -> watch::Receiver<u64>;

    fn session_state(&self) -> watch::Receiver<SessionState>;
}

/// Reject paths that are empty, relative or contain empty segments.
pub fn validate_path(path: &str) -> Result<(), CoordinationError> {
    let valid = path.len() > 1
        && path.starts_with('/')
        && !path.ends_with('/')
        && !path[1..].split('/').any(str::is_empty);
    if valid {
        Ok(())
    } else {
        Err(CoordinationError::InvalidPath(path.to_owned()))
    }
}

pub fn join_path(parent: &str, child: &str) -> String {
    format!("{}/{child}", parent.trim_end_matches('/'))
}

/// Parent of `path`; `/` for top-level nodes.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}
