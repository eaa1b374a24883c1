//! Webhooks: cluster-wide subscriptions that deliver a channel's new
//! items, in key order and at least once, to a callback URL.

pub mod dao;
pub mod delivery;
pub mod leader;
pub mod processor;
pub mod service;
pub mod status;
pub mod validator;

pub use dao::{CoordinatorWebhookDao, WebhookDao};
pub use delivery::{DeliveryError, HttpDelivery, WebhookDelivery, calculate_retry_delay};
pub use leader::{WebhookContext, WebhookLeader};
pub use processor::WebhookProcessor;
pub use service::WebhookService;
pub use status::{DeliveryState, WebhookStatus};
