//! HTTP API.
//!
//! # Endpoints
//!
//! - `GET    /channel`                      – channel configs, optionally `?tag=`
//! - `PUT    /channel/{name}`               – create or update a channel
//! - `GET    /channel/{name}`               – channel config
//! - `DELETE /channel/{name}`               – delete a channel and its content
//! - `POST   /channel/{name}`               – insert an item
//! - `GET    /channel/{name}/latest`        – latest key
//! - `GET    /channel/{name}/keys`          – keys after or before a start key
//! - `GET    /channel/{name}/time`          – keys of one time bucket
//! - `GET    /channel/{name}/{*key}`        – one item
//! - `GET    /webhook`                      – webhook names
//! - `PUT    /webhook/{name}`               – create or update a webhook
//! - `GET    /webhook/{name}`               – definition and delivery status
//! - `DELETE /webhook/{name}`               – delete a webhook
//! - `POST   /internal/replication/{name}`  – items pushed by an upstream hub
//! - `GET    /replication`                  – replication lag per channel

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hub_core::HubError;
use hub_core::replication::ReplicationError;

use crate::state::AppState;

mod channel;
mod replication;
mod webhook;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channel", get(channel::list_channels))
        .route(
            "/channel/{name}",
            get(channel::get_channel)
                .put(channel::put_channel)
                .delete(channel::delete_channel)
                .post(channel::insert_item),
        )
        .route("/channel/{name}/latest", get(channel::latest))
        .route("/channel/{name}/keys", get(channel::keys))
        .route("/channel/{name}/time", get(channel::time_bucket))
        .route("/channel/{name}/{*key}", get(channel::get_item))
        .route("/webhook", get(webhook::list_webhooks))
        .route(
            "/webhook/{name}",
            get(webhook::get_webhook)
                .put(webhook::put_webhook)
                .delete(webhook::delete_webhook),
        )
        .route(
            "/internal/replication/{name}",
            post(replication::receive),
        )
        .route("/replication", get(replication::status))
}

/// Errors that can occur in API handlers.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error(transparent)]
    Replication(#[from] ReplicationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Hub(e) => hub_error_response(e),
            ApiError::Replication(ReplicationError::Hub(e)) => hub_error_response(e),
            ApiError::Replication(ReplicationError::InvalidUri(uri)) => {
                (StatusCode::BAD_REQUEST, format!("invalid item uri: {uri}")).into_response()
            }
            ApiError::Replication(e @ ReplicationError::Upstream(_)) => {
                tracing::warn!(error = %e, "Upstream hub request failed");
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
        }
    }
}

fn hub_error_response(error: HubError) -> Response {
    let status = match &error {
        HubError::NotFound(_) => StatusCode::NOT_FOUND,
        HubError::Forbidden(_) => StatusCode::FORBIDDEN,
        HubError::Conflict(_) => StatusCode::CONFLICT,
        HubError::Invalid(_) => StatusCode::BAD_REQUEST,
        e if e.is_transient() => {
            tracing::warn!(error = %e, "Hub temporarily unavailable");
            return (StatusCode::SERVICE_UNAVAILABLE, "service unavailable").into_response();
        }
        e => {
            tracing::error!(error = %e, "Hub API internal error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };
    (status, error.to_string()).into_response()
}


#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::storage::StorageError;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: ApiError| e.into_response().status();
        assert_eq!(status(HubError::not_found("x").into()), StatusCode::NOT_FOUND);
        assert_eq!(status(HubError::Forbidden("x".into()).into()), StatusCode::FORBIDDEN);
        assert_eq!(status(HubError::Conflict("x".into()).into()), StatusCode::CONFLICT);
        assert_eq!(status(HubError::Invalid("x".into()).into()), StatusCode::BAD_REQUEST);
        let timeout = HubError::Storage(StorageError::Timeout("slow".into()));
        assert_eq!(status(timeout.into()), StatusCode::SERVICE_UNAVAILABLE);
        let down = HubError::Storage(StorageError::Unavailable("down".into()));
        assert_eq!(status(down.into()), StatusCode::INTERNAL_SERVER_ERROR);
        let wrapped = ReplicationError::Hub(HubError::Forbidden("x".into()));
        assert_eq!(status(wrapped.into()), StatusCode::FORBIDDEN);
        let uri = ReplicationError::InvalidUri("nope".into());
        assert_eq!(status(uri.into()), StatusCode::BAD_REQUEST);
    }
}
