//! Value types shared by every layer of the hub.

pub mod channel;
pub mod key;
pub mod query;
pub mod webhook;

pub use channel::{ChannelConfig, channel_key};
pub use key::ContentKey;
pub use query::{DirectionQuery, TimeQuery, TimeUnit};
pub use webhook::Webhook;
