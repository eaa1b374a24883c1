#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod entities;
pub mod error;
pub mod framework;
pub mod model;
pub mod notify;
pub mod persistence;
pub mod replication;
pub mod storage;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use error::HubError;
pub use model::ContentKey;
