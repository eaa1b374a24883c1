use crate::error::HubError;
use crate::model::ChannelConfig;

pub const MAX_NAME_LEN: usize = 48;
const MAX_TAG_LEN: usize = 48;
const MAX_DESCRIPTION_LEN: usize = 1024;

/// Names of channels and webhooks: ASCII letters, digits, `_` and `-`.
pub fn validate_name(kind: &str, name: &str, max_len: usize) -> Result<(), HubError> {
    if name.is_empty() {
        return Err(HubError::Invalid(format!("{kind} name is required")));
    }
    if name.len() > max_len {
        return Err(HubError::Invalid(format!(
            "{kind} name must be at most {max_len} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(HubError::Invalid(format!(
            "{kind} name may only contain letters, digits, '_' and '-': {name}"
        )));
    }
    Ok(())
}

pub fn validate_channel(config: &ChannelConfig) -> Result<(), HubError> {
    validate_name("channel", &config.name, MAX_NAME_LEN)?;
    if config.description.len() > MAX_DESCRIPTION_LEN {
        return Err(HubError::Invalid(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    for tag in &config.tags {
        if tag.is_empty()
            || tag.len() > MAX_TAG_LEN
            || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '-')
        {
            return Err(HubError::Invalid(format!("invalid tag: {tag:?}")));
        }
    }
    if let Some(source) = &config.replication_source {
        if !matches!(source.scheme(), "http" | "https") {
            return Err(HubError::Invalid(format!(
                "replication source must be an http url: {source}"
            )));
        }
        if config.global_master {
            return Err(HubError::Invalid(
                "a global master channel cannot replicate from another hub".to_owned(),
            ));
        }
    }
    Ok(())
}
