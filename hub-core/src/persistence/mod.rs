//! Durable state backends for definitions and cursors.
//!
//! The coordination-service implementations live next to their traits
//! ([`crate::channel::CoordinatorChannelConfigDao`],
//! [`crate::webhook::CoordinatorWebhookDao`],
//! [`crate::cluster::LastContentPath`]); this module holds the PostgreSQL
//! one.

pub mod postgres;

pub use postgres::PgStateStore;
