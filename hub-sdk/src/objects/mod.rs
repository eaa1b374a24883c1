pub mod channel;
pub mod webhook;

pub use channel::{ChannelRequest, InsertedContent, LatestKey};
pub use webhook::{BatchMode, PayloadKind, WebhookPayload, WebhookRequest};
