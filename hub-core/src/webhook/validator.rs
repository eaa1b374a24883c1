use crate::channel::validator::validate_name;
use crate::error::HubError;
use crate::model::Webhook;

const MAX_NAME_LEN: usize = 128;

pub fn validate_webhook(webhook: &Webhook) -> Result<(), HubError> {
    validate_name("webhook", &webhook.name, MAX_NAME_LEN)?;
    for (field, url) in [
        ("channelUrl", &webhook.channel_url),
        ("callbackUrl", &webhook.callback_url),
    ] {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HubError::Invalid(format!("{field} must be an http url: {url}")));
        }
    }
    if webhook.channel_name().is_none() {
        return Err(HubError::Invalid(format!(
            "channelUrl must end in /channel/{{name}}: {}",
            webhook.channel_url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn hook(name: &str, channel: &str, callback: &str) -> Webhook {
        Webhook::new(name, Url::parse(channel).unwrap(), Url::parse(callback).unwrap())
    }

    #[test]
    fn test_validation() {
        assert!(validate_webhook(&hook("w1", "http://hub/channel/a", "https://cb/x")).is_ok());
        assert!(validate_webhook(&hook("bad name", "http://hub/channel/a", "http://cb")).is_err());
        assert!(validate_webhook(&hook("w", "http://hub/nochannel", "http://cb")).is_err());
        assert!(validate_webhook(&hook("w", "http://hub/channel/a", "ftp://cb")).is_err());
    }
}
