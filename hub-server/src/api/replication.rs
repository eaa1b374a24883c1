//! Replication callback and status handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use hub_core::replication::ReplicationStatus;
use hub_sdk::objects::WebhookPayload;
use serde::Serialize;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReceiveResponse {
    written: usize,
}

/// `POST /internal/replication/{name}`: the upstream hub's webhook
/// callback for a replicating channel.
pub async fn receive(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<ReceiveResponse>, ApiError> {
    let written = state.receiver.receive(&name, &payload).await?;
    Ok(Json(ReceiveResponse { written }))
}

/// `GET /replication`: lag of every replicating channel.
pub async fn status(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReplicationStatus>>, ApiError> {
    Ok(Json(state.replication.status().await?))
}
