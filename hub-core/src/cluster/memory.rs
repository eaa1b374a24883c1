//! In-process coordination service.
//!
//! One [`InMemoryCoordinator`] is the shared cluster state; every
//! simulated process talks to it through its own [`InMemorySession`].
//! Sessions can be suspended, expired and reconnected, which removes
//! their ephemeral nodes and fires the same watches a real service would.

use super::coordinator::{
    CoordinationError, Coordinator, SessionState, join_path, parent_path, validate_path,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

struct Node {
    data: Vec<u8>,
    owner: Option<Uuid>,
}

#[derive(Default)]
struct ClusterState {
    nodes: BTreeMap<String, Node>,
    sequences: HashMap<String, u64>,
    watchers: HashMap<String, watch::Sender<u64>>,
}

impl ClusterState {
    fn touch(&mut self, parent: &str) {
        if let Some(tx) = self.watchers.get(parent) {
            tx.send_modify(|v| *v += 1);
        }
    }

    fn children(&self, parent: &str) -> Vec<String> {
        let prefix = join_path(parent, "");
        self.nodes
            .range(prefix.clone()..)
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(&prefix))
            .filter_map(|path| {
                let rest = &path[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_owned())
            })
            .collect()
    }

    fn drop_ephemerals(&mut self, owner: Uuid) {
        let doomed: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(owner))
            .map(|(path, _)| path.clone())
            .collect();
        for path in doomed {
            self.nodes.remove(&path);
            self.touch(parent_path(&path));
        }
    }
}

/// Shared state of one simulated coordination cluster.
#[derive(Clone, Default)]
pub struct InMemoryCoordinator {
    state: Arc<Mutex<ClusterState>>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client session against this cluster.
    pub fn session(&self) -> InMemorySession {
        let (state_tx, _) = watch::channel(SessionState::Connected);
        InMemorySession {
            cluster: self.clone(),
            id: Mutex::new(Uuid::new_v4()),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One process's connection to an [`InMemoryCoordinator`].
pub struct InMemorySession {
    cluster: InMemoryCoordinator,
    id: Mutex<Uuid>,
    state_tx: watch::Sender<SessionState>,
}

impl InMemorySession {
    fn id(&self) -> Uuid {
        *self.id.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_connected(&self) -> Result<(), CoordinationError> {
        match *self.state_tx.borrow() {
            SessionState::Connected => Ok(()),
            SessionState::Suspended => Err(CoordinationError::Unavailable(
                "connection suspended".to_owned(),
            )),
            SessionState::Lost => Err(CoordinationError::SessionLost),
        }
    }

    /// Interrupt the connection without expiring the session.
    pub fn suspend(&self) {
        self.state_tx.send_replace(SessionState::Suspended);
    }

    /// Expire the session: its ephemeral nodes are deleted.
    pub fn expire(&self) {
        let id = self.id();
        self.cluster.lock().drop_ephemerals(id);
        debug!(session = %id, "Session expired");
        self.state_tx.send_replace(SessionState::Lost);
    }

    /// Reconnect. An expired session comes back as a fresh session.
    pub fn reconnect(&self) {
        if *self.state_tx.borrow() == SessionState::Lost {
            *self.id.lock().unwrap_or_else(|e| e.into_inner()) = Uuid::new_v4();
        }
        self.state_tx.send_replace(SessionState::Connected);
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        let id = self.id();
        self.cluster.lock().drop_ephemerals(id);
    }
}

#[async_trait]
impl Coordinator for InMemorySession {
    async fn create_ephemeral_sequential(
        &self,
        parent: &str,
        prefix: &str,
    ) -> Result<String, CoordinationError> {
        validate_path(parent)?;
        self.check_connected()?;
        let owner = self.id();
        let mut cluster = self.cluster.lock();
        let sequence = cluster.sequences.entry(parent.to_owned()).or_insert(0);
        let path = join_path(parent, &format!("{prefix}{:010}", *sequence));
        *sequence += 1;
        cluster.nodes.insert(
            path.clone(),
            Node {
                data: Vec::new(),
                owner: Some(owner),
            },
        );
        cluster.touch(parent);
        Ok(path)
    }

    async fn get_children(&self, parent: &str) -> Result<Vec<String>, CoordinationError> {
        validate_path(parent)?;
        self.check_connected()?;
        Ok(self.cluster.lock().children(parent))
    }

    async fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        validate_path(path)?;
        self.check_connected()?;
        let mut cluster = self.cluster.lock();
        if cluster.nodes.remove(path).is_none() {
            return Err(CoordinationError::NoNode(path.to_owned()));
        }
        cluster.touch(parent_path(path));
        Ok(())
    }

    async fn get_data(&self, path: &str) -> Result<Option<Vec<u8>>, CoordinationError> {
        validate_path(path)?;
        self.check_connected()?;
        Ok(self.cluster.lock().nodes.get(path).map(|n| n.data.clone()))
    }

    async fn set_data(&self, path: &str, data: Vec<u8>) -> Result<(), CoordinationError> {
        validate_path(path)?;
        self.check_connected()?;
        let mut cluster = self.cluster.lock();
        let created = cluster
            .nodes
            .insert(path.to_owned(), Node { data, owner: None })
            .is_none();
        if created {
            cluster.touch(parent_path(path));
        }
        Ok(())
    }

    async fn create_if_absent(&self, path: &str, data: Vec<u8>) -> Result<bool, CoordinationError> {
        validate_path(path)?;
        self.check_connected()?;
        let mut cluster = self.cluster.lock();
        if cluster.nodes.contains_key(path) {
            return Ok(false);
        }
        cluster
            .nodes
            .insert(path.to_owned(), Node { data, owner: None });
        cluster.touch(parent_path(path));
        Ok(true)
    }

    fn watch_children(&self, parent: &str) -> watch::Receiver<u64> {
        self.cluster
            .lock()
            .watchers
            .entry(parent.to_owned())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    fn session_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_children_sort_in_creation_order() {
        let cluster = InMemoryCoordinator::new();
        let a = cluster.session();
        let b = cluster.session();
        let first = a.create_ephemeral_sequential("/jobs/x", "lock-").await.unwrap();
        let second = b.create_ephemeral_sequential("/jobs/x", "lock-").await.unwrap();
        assert!(first < second);

        let mut children = a.get_children("/jobs/x").await.unwrap();
        children.sort();
        assert_eq!(children, vec!["lock-0000000000", "lock-0000000001"]);
        assert!(a.get_children("/jobs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expiry_removes_ephemerals_and_fires_watch() {
        let cluster = InMemoryCoordinator::new();
        let a = cluster.session();
        let b = cluster.session();
        a.create_ephemeral_sequential("/jobs/x", "lock-").await.unwrap();
        b.set_data("/jobs/x-config", b"keep".to_vec()).await.unwrap();

        let mut watch = b.watch_children("/jobs/x");
        a.expire();
        watch.changed().await.unwrap();

        assert!(b.get_children("/jobs/x").await.unwrap().is_empty());
        assert!(matches!(
            a.get_children("/jobs/x").await,
            Err(CoordinationError::SessionLost)
        ));
        a.reconnect();
        assert_eq!(
            a.get_data("/jobs/x-config").await.unwrap(),
            Some(b"keep".to_vec())
        );
    }

    #[tokio::test]
    async fn test_create_if_absent() {
        let session = InMemoryCoordinator::new().session();
        assert!(session.create_if_absent("/c/a", vec![1]).await.unwrap());
        assert!(!session.create_if_absent("/c/a", vec![2]).await.unwrap());
        assert_eq!(session.get_data("/c/a").await.unwrap(), Some(vec![1]));
        session.delete("/c/a").await.unwrap();
        assert!(matches!(
            session.delete("/c/a").await,
            Err(CoordinationError::NoNode(_))
        ));
    }
}
