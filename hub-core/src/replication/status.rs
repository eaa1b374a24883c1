use crate::model::ContentKey;
use serde::Serialize;
use url::Url;

/// How far one replicating channel lags behind its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationStatus {
    pub channel: String,
    pub source: Url,
    pub group: String,
    /// Whether this process registered the upstream webhook.
    pub active: bool,
    /// Latest stable key of the local replica.
    pub local_latest: Option<ContentKey>,
    /// Greatest key written by the replication receiver.
    pub last_replicated: Option<ContentKey>,
    pub upstream_latest: Option<ContentKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_error: Option<String>,
}

impl ReplicationStatus {
    /// Caught up when nothing newer than the last replicated key exists
    /// upstream.
    pub fn is_caught_up(&self) -> bool {
        match (&self.upstream_latest, &self.last_replicated) {
            (None, _) => true,
            (Some(upstream), Some(replicated)) => upstream <= replicated,
            (Some(_), None) => false,
        }
    }
}
