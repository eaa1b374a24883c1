use super::upstream::UpstreamHub;
use crate::config::ReplicationSettings;
use crate::model::ChannelConfig;
use hub_sdk::client::ClientError;
use hub_sdk::objects::{BatchMode, WebhookRequest};
use tracing::info;
use url::Url;

/// The upstream webhook that feeds one replicating channel.
///
/// Its name depends only on the environment and the channel, so a
/// registration made before a restart is found and updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReplicator {
    channel: String,
    source: Url,
    group_name: String,
    callback_url: String,
}

impl ChannelReplicator {
    /// `None` unless the channel replicates.
    pub fn new(config: &ChannelConfig, settings: &ReplicationSettings) -> Option<Self> {
        let source = config.replication_source.clone()?;
        Some(Self::for_source(&config.name, source, settings))
    }

    /// The replicator of `channel` fed from `source`, whether or not the
    /// channel still exists.
    pub fn for_source(channel: &str, source: Url, settings: &ReplicationSettings) -> Self {
        Self {
            channel: channel.to_owned(),
            source,
            group_name: group_name(settings, channel),
            callback_url: callback_url(settings, channel),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub async fn start(&self, upstream: &dyn UpstreamHub) -> Result<(), ClientError> {
        let request = WebhookRequest {
            channel_url: self.source.clone(),
            callback_url: Url::parse(&self.callback_url)?,
            starting_key: None,
            batch: BatchMode::Single,
            max_attempts: None,
            secret: None,
        };
        upstream
            .register(&self.source, &self.group_name, &request)
            .await?;
        info!(
            channel = %self.channel,
            source = %self.source,
            group = %self.group_name,
            "Started replication"
        );
        Ok(())
    }

    pub async fn stop(&self, upstream: &dyn UpstreamHub) -> Result<(), ClientError> {
        upstream.unregister(&self.source, &self.group_name).await?;
        info!(channel = %self.channel, group = %self.group_name, "Stopped replication");
        Ok(())
    }
}

pub fn group_name(settings: &ReplicationSettings, channel: &str) -> String {
    let environment = format!("{}_{}", settings.app_name, settings.environment).replace('-', "_");
    format!("Repl_{environment}_{channel}")
}

pub fn callback_url(settings: &ReplicationSettings, channel: &str) -> String {
    let app_url = settings.app_url.trim_end_matches('/');
    format!("{app_url}/internal/replication/{channel}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn settings() -> ReplicationSettings {
        ReplicationSettings {
            app_name: "hub-v2".into(),
            environment: "prod-east".into(),
            app_url: "http://hub.local:8080".into(),
            ..ReplicationSettings::default()
        }
    }

    #[test]
    fn test_names_are_deterministic() {
        assert_eq!(group_name(&settings(), "my-chan"), "Repl_hub_v2_prod_east_my-chan");
        assert_eq!(
            callback_url(&settings(), "my-chan"),
            "http://hub.local:8080/internal/replication/my-chan"
        );
    }

    #[test]
    fn test_only_replicating_channels_get_a_replicator() {
        let plain = ChannelConfig::new("UHF", datetime!(2024-01-01 00:00 UTC));
        assert!(ChannelReplicator::new(&plain, &settings()).is_none());
        let source = Url::parse("http://upstream/channel/UHF").unwrap();
        let replicating = plain.with_replication_source(source.clone());
        let replicator = ChannelReplicator::new(&replicating, &settings()).unwrap();
        assert_eq!(replicator.source(), &source);
        assert_eq!(replicator.group_name(), "Repl_hub_v2_prod_east_UHF");
    }
}
