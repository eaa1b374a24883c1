//! Error taxonomy surfaced by hub operations.

use crate::cluster::CoordinationError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// Unknown channel or webhook.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write attempted on a channel that is replicating from elsewhere.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An update would change an immutable field.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request failed validation.
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HubError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Whether a retry on the next cycle may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HubError::Storage(e) => e.is_transient(),
            HubError::Coordination(_) | HubError::Database(_) => true,
            _ => false,
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
