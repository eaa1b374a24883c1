//! PostgreSQL rows and the queries over them, one
//! `kanau::processor::Processor` impl on `DatabaseProcessor` per query.

pub mod channel_configs;
pub mod content_objects;
pub mod cursors;
pub mod webhooks;
