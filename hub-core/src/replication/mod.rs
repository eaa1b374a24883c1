//! Replication: channels that copy every item of a channel on another
//! hub. The upstream hub pushes new items to this hub through a webhook
//! that the [`ReplicationManager`] keeps registered.

pub mod manager;
pub mod receiver;
pub mod replicator;
pub mod status;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{MANAGER_ELECTION_PATH, ReplicationManager};
pub use receiver::ReplicationReceiver;
pub use replicator::ChannelReplicator;
pub use status::ReplicationStatus;
pub use upstream::{HttpUpstream, UpstreamHub};

use crate::error::HubError;
use hub_sdk::client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("upstream error: {0}")]
    Upstream(#[from] ClientError),

    #[error("invalid item uri: {0}")]
    InvalidUri(String),
}
