//! Shared wire types for the content hub.
//!
//! - [`objects`]: request/response bodies exchanged between hubs and
//!   webhook receivers
//! - [`signature`]: HMAC-SHA256 body signing for webhook deliveries
//! - `client`: typed HTTP client for a remote hub (feature `client`)

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
