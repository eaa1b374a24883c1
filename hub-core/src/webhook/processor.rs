//! Keeps one leader election running per persisted webhook.

use super::dao::WebhookDao;
use super::leader::{WebhookContext, WebhookLeader};
use super::status::DeliveryState;
use crate::cluster::{Coordinator, LeaderElection, election_path};
use crate::error::HubError;
use crate::model::Webhook;
use crate::notify::Watchers;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

struct ActiveJob {
    webhook: Webhook,
    election: LeaderElection,
    state: Arc<DeliveryState>,
}

/// Reconciles running webhook jobs against the persisted definitions.
///
/// Every process runs one of these and joins the election of every
/// webhook; the election makes sure only one process delivers. Changes
/// made through this process arrive on [`Watchers`]; changes made
/// elsewhere are picked up by the periodic reconcile.
pub struct WebhookProcessor {
    dao: Arc<dyn WebhookDao>,
    coordinator: Arc<dyn Coordinator>,
    context: Arc<WebhookContext>,
    watchers: Watchers,
    jobs: Mutex<HashMap<String, ActiveJob>>,
}

impl WebhookProcessor {
    pub fn new(
        dao: Arc<dyn WebhookDao>,
        coordinator: Arc<dyn Coordinator>,
        context: Arc<WebhookContext>,
        watchers: Watchers,
    ) -> Self {
        Self {
            dao,
            coordinator,
            context,
            watchers,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn watchers(&self) -> &Watchers {
        &self.watchers
    }

    /// Run until shutdown is signaled, then close every election.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut changes = self.watchers.subscribe();
        let mut reconcile = tokio::time::interval(self.context.settings.reconcile_interval);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("WebhookProcessor started");

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("WebhookProcessor received shutdown signal");
                        break;
                    }
                }

                Ok(()) = changes.changed() => self.reconcile_logged().await,

                _ = reconcile.tick() => self.reconcile_logged().await,
            }
        }

        self.stop_all().await;
        info!("WebhookProcessor shutdown complete");
    }

    async fn reconcile_logged(&self) {
        if let Err(e) = self.reconcile().await {
            error!(error = %e, "Failed to reconcile webhooks");
        }
    }

    /// Stop jobs whose webhook was removed or redefined and start jobs
    /// for webhooks not yet running here.
    pub async fn reconcile(&self) -> Result<(), HubError> {
        let desired = self.dao.get_all().await?;
        let mut jobs = self.jobs.lock().await;

        let stale: Vec<String> = jobs
            .iter()
            .filter(|(name, job)| {
                !desired
                    .iter()
                    .any(|w| &w.name == *name && w.same_definition(&job.webhook))
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            if let Some(job) = jobs.remove(&name) {
                info!(webhook = %name, "Stopping webhook job");
                job.election.close().await;
            }
        }

        for webhook in desired {
            if jobs.contains_key(&webhook.name) {
                continue;
            }
            let name = webhook.name.clone();
            match self.start_job(webhook) {
                Some(job) => {
                    info!(webhook = %name, "Started webhook job");
                    jobs.insert(name, job);
                }
                None => warn!(webhook = %name, "Webhook has no channel, not starting"),
            }
        }
        Ok(())
    }

    fn start_job(&self, webhook: Webhook) -> Option<ActiveJob> {
        let state = Arc::new(DeliveryState::default());
        let leader = WebhookLeader::new(webhook.clone(), self.context.clone(), state.clone())?;
        let election = LeaderElection::new(
            election_path("webhook", &webhook.name),
            self.coordinator.clone(),
            Arc::new(leader),
            self.context.settings.election,
        );
        election.start();
        Some(ActiveJob {
            webhook,
            election,
            state,
        })
    }

    /// Stop the local job of a webhook, if any.
    pub async fn stop(&self, name: &str) {
        let job = self.jobs.lock().await.remove(name);
        if let Some(job) = job {
            job.election.close().await;
            info!(webhook = %name, "Stopped webhook job");
        }
    }

    async fn stop_all(&self) {
        let jobs: Vec<ActiveJob> = self.jobs.lock().await.drain().map(|(_, j)| j).collect();
        for job in jobs {
            job.election.close().await;
        }
    }

    /// Whether this process leads the webhook, with its live state.
    pub async fn delivery_state(&self, name: &str) -> Option<(bool, Arc<DeliveryState>)> {
        let jobs = self.jobs.lock().await;
        let job = jobs.get(name)?;
        Some((job.election.is_leading(), job.state.clone()))
    }

    pub async fn running_jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}
