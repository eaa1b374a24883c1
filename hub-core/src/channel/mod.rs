//! Channels: configuration persistence, caching, validation and the
//! service that ties them to content storage.

pub mod cache;
pub mod config_dao;
pub mod service;
pub mod validator;

pub use cache::ChannelConfigCache;
pub use config_dao::{ChannelConfigDao, CoordinatorChannelConfigDao};
pub use service::ChannelService;
