//! Cluster-wide owner of the upstream registrations of replicating
//! channels.

use super::replicator::ChannelReplicator;
use super::status::ReplicationStatus;
use super::upstream::UpstreamHub;
use crate::channel::ChannelService;
use crate::cluster::coordinator::join_path;
use crate::cluster::{
    CoordinationError, Coordinator, CursorKind, CursorStore, Leader, LeaderElection, Leadership,
};
use crate::config::ReplicationSettings;
use crate::error::HubError;
use crate::notify::Watchers;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

pub const MANAGER_ELECTION_PATH: &str = "/ReplicationManager";

/// One persistent node per upstream registration, named after the
/// channel and holding its source URL. Outlives leadership terms.
pub const REGISTRATIONS_PATH: &str = "/ReplicationRegistrations";

/// Keeps one upstream webhook registered per replicating channel.
///
/// Runs only while leading [`MANAGER_ELECTION_PATH`]. Channel changes made
/// through this process arrive on the channel service's replication
/// [`Watchers`]; everything else is caught by the periodic reconcile.
///
/// What is registered upstream is read from [`REGISTRATIONS_PATH`], so a
/// leader also tears down channels deleted or changed while nobody led.
pub struct ReplicationManager {
    channels: Arc<ChannelService>,
    cursors: Arc<dyn CursorStore>,
    coordinator: Arc<dyn Coordinator>,
    upstream: Arc<dyn UpstreamHub>,
    settings: ReplicationSettings,
    watchers: Watchers,
    active: Mutex<HashMap<String, ChannelReplicator>>,
}

impl ReplicationManager {
    pub fn new(
        channels: Arc<ChannelService>,
        cursors: Arc<dyn CursorStore>,
        coordinator: Arc<dyn Coordinator>,
        upstream: Arc<dyn UpstreamHub>,
        settings: ReplicationSettings,
        watchers: Watchers,
    ) -> Self {
        Self {
            channels,
            cursors,
            coordinator,
            upstream,
            settings,
            watchers,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// The election this manager runs under. Call `start` on it once.
    pub fn election(self: &Arc<Self>, coordinator: Arc<dyn Coordinator>) -> LeaderElection {
        LeaderElection::new(
            MANAGER_ELECTION_PATH,
            coordinator,
            self.clone(),
            self.settings.election,
        )
    }

    /// Stop registrations of channels that no longer replicate (or whose
    /// source moved) and start registrations for new ones. A failed
    /// registration or teardown is retried on the next reconcile.
    pub async fn reconcile(&self) -> Result<(), HubError> {
        let desired: HashMap<String, ChannelReplicator> = self
            .channels
            .replicating_channels()
            .await?
            .iter()
            .filter_map(|config| ChannelReplicator::new(config, &self.settings))
            .map(|r| (r.channel().to_owned(), r))
            .collect();
        let registered = self.registered().await?;
        let mut active = self.active.lock().await;
        active.retain(|name, replicator| desired.get(name) == Some(&*replicator));

        // Channels whose old registration is still up keep waiting for it.
        let mut pending = HashSet::new();
        for (name, replicator) in &registered {
            if desired.get(name) == Some(replicator) {
                continue;
            }
            match replicator.stop(self.upstream.as_ref()).await {
                Ok(()) => self.forget(name).await?,
                Err(e) => {
                    warn!(channel = %name, error = %e, "Failed to stop replication");
                    pending.insert(name.clone());
                }
            }
        }

        for (name, replicator) in desired {
            if pending.contains(&name) || active.contains_key(&name) {
                continue;
            }
            // Recorded before registering, or a crash in between leaks it.
            self.record(&replicator).await?;
            match replicator.start(self.upstream.as_ref()).await {
                Ok(()) => {
                    active.insert(name, replicator);
                }
                Err(e) => warn!(channel = %name, error = %e, "Failed to start replication"),
            }
        }
        Ok(())
    }

    /// Registrations recorded by any leader, keyed by channel.
    async fn registered(&self) -> Result<HashMap<String, ChannelReplicator>, HubError> {
        let mut registered = HashMap::new();
        for channel in self.coordinator.get_children(REGISTRATIONS_PATH).await? {
            let path = join_path(REGISTRATIONS_PATH, &channel);
            let Some(data) = self.coordinator.get_data(&path).await? else {
                continue;
            };
            let source = std::str::from_utf8(&data)
                .ok()
                .and_then(|s| Url::parse(s).ok());
            let Some(source) = source else {
                warn!(%channel, "Recorded replication source is not a URL");
                continue;
            };
            let replicator = ChannelReplicator::for_source(&channel, source, &self.settings);
            registered.insert(channel, replicator);
        }
        Ok(registered)
    }

    async fn record(&self, replicator: &ChannelReplicator) -> Result<(), HubError> {
        let path = join_path(REGISTRATIONS_PATH, replicator.channel());
        let source = replicator.source().as_str().as_bytes().to_vec();
        self.coordinator.set_data(&path, source).await?;
        Ok(())
    }

    async fn forget(&self, channel: &str) -> Result<(), HubError> {
        match self
            .coordinator
            .delete(&join_path(REGISTRATIONS_PATH, channel))
            .await
        {
            Ok(()) | Err(CoordinationError::NoNode(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Channels this process registered while leading.
    pub async fn active_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn status(&self) -> Result<Vec<ReplicationStatus>, HubError> {
        let active = self.active_channels().await;
        let mut statuses = Vec::new();
        for config in self.channels.replicating_channels().await? {
            let Some(replicator) = ChannelReplicator::new(&config, &self.settings) else {
                continue;
            };
            let local_latest = self
                .channels
                .get_latest(&config.name, true)
                .await
                .ok()
                .flatten();
            let last_replicated = self
                .cursors
                .get_or_null(&config.name, CursorKind::ReplicationLastUpdated)
                .await?;
            let (upstream_latest, upstream_error) =
                match self.upstream.latest(replicator.source()).await {
                    Ok(latest) => (latest, None),
                    Err(e) => (None, Some(e.to_string())),
                };
            statuses.push(ReplicationStatus {
                active: active.contains(&config.name),
                channel: config.name,
                source: replicator.source().clone(),
                group: replicator.group_name().to_owned(),
                local_latest,
                last_replicated,
                upstream_latest,
                upstream_error,
            });
        }
        Ok(statuses)
    }
}

#[async_trait]
impl Leader for ReplicationManager {
    async fn take_leadership(&self, leadership: &Leadership) -> anyhow::Result<()> {
        info!("Leading replication");
        let mut changes = self.watchers.subscribe();
        loop {
            if let Err(e) = self.reconcile().await {
                warn!(error = %e, "Failed to reconcile replication");
            }
            tokio::select! {
                biased;
                _ = leadership.lost() => break,
                Ok(()) = changes.changed() => {}
                _ = tokio::time::sleep(self.settings.reconcile_interval) => {}
            }
        }
        // The next leader re-registers everything; registrations are
        // idempotent upstream and the records stay behind for it.
        self.active.lock().await.clear();
        info!("Stopped leading replication");
        Ok(())
    }
}
