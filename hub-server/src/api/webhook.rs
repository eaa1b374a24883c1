//! Webhook definition and status handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hub_core::model::Webhook;
use hub_core::webhook::WebhookStatus;
use hub_sdk::objects::{BatchMode, WebhookRequest};
use serde::Serialize;
use url::Url;

use super::ApiError;
use crate::state::AppState;

/// A webhook as shown to API clients. The secret is never echoed back.
#[derive(Debug, Serialize)]
pub struct WebhookView {
    name: String,
    channel_url: Url,
    callback_url: Url,
    batch: BatchMode,
    max_attempts: u32,
    signed: bool,
}

impl From<Webhook> for WebhookView {
    fn from(webhook: Webhook) -> Self {
        Self {
            signed: webhook.secret.is_some(),
            name: webhook.name,
            channel_url: webhook.channel_url,
            callback_url: webhook.callback_url,
            batch: webhook.batch,
            max_attempts: webhook.max_attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    webhook: WebhookView,
    status: WebhookStatus,
}

/// `GET /webhook`: names of every webhook.
pub async fn list_webhooks(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let mut names: Vec<String> = state
        .webhooks
        .get_all()
        .await?
        .into_iter()
        .map(|w| w.name)
        .collect();
    names.sort();
    Ok(Json(names))
}

/// `PUT /webhook/{name}`: create or update a webhook. A `starting_key`
/// re-points delivery to resume after that key.
pub async fn put_webhook(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<WebhookRequest>,
) -> Result<Response, ApiError> {
    let webhook = Webhook::from_request(&name, request).map_err(ApiError::BadRequest)?;
    let previous = state.webhooks.upsert(webhook).await?;
    let response = webhook_response(&state, &name).await?;
    let status = if previous.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(response)).into_response())
}

/// `GET /webhook/{name}`: definition plus delivery status.
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<WebhookResponse>, ApiError> {
    Ok(Json(webhook_response(&state, &name).await?))
}

/// `DELETE /webhook/{name}`
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.webhooks.delete(&name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("webhook {name} not found")))
    }
}

async fn webhook_response(state: &AppState, name: &str) -> Result<WebhookResponse, ApiError> {
    let webhook = state
        .webhooks
        .get(name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("webhook {name} not found")))?;
    let status = state.webhooks.get_status(name).await?;
    Ok(WebhookResponse {
        webhook: webhook.into(),
        status,
    })
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{APP_URL, TestApp};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use std::time::Duration;

    fn definition() -> serde_json::Value {
        json!({
            "channel_url": format!("{APP_URL}channel/feed"),
            "callback_url": "http://client/callback",
            "secret": "s3cret",
        })
    }

    #[tokio::test]
    async fn test_webhook_crud() {
        let app = TestApp::new();
        let (status, _) = app.json("PUT", "/webhook/w", definition()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "channel must exist");

        app.json("PUT", "/channel/feed", json!({})).await;
        let (status, body) = app.json("PUT", "/webhook/w", definition()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["webhook"]["signed"], true);
        assert!(body["webhook"].get("secret").is_none());

        let (status, _) = app.json("PUT", "/webhook/w", definition()).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.get_json("/webhook").await;
        assert_eq!(body, json!(["w"]));

        let mut moved = definition();
        moved["channel_url"] = json!(format!("{APP_URL}channel/other"));
        app.json("PUT", "/channel/other", json!({})).await;
        let (status, _) = app.json("PUT", "/webhook/w", moved).await;
        assert_eq!(status, StatusCode::CONFLICT);

        assert_eq!(app.delete("/webhook/w").await, StatusCode::NO_CONTENT);
        assert_eq!(app.get("/webhook/w").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_starting_key_is_rejected() {
        let app = TestApp::new();
        app.json("PUT", "/channel/feed", json!({})).await;
        let mut body = definition();
        body["starting_key"] = json!("not-a-key");
        let (status, _) = app.json("PUT", "/webhook/w", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_items_inserted_over_http_are_delivered() {
        let app = TestApp::new();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let processor = tokio::spawn(app.hub.processor.clone().run(shutdown_rx));

        app.json("PUT", "/channel/feed", json!({})).await;
        app.json("PUT", "/webhook/w", definition()).await;
        let request = Request::builder()
            .method("POST")
            .uri("/channel/feed")
            .body(Body::from("hello"))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::CREATED);
        let inserted: serde_json::Value = serde_json::from_slice(&body).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while app.delivery.payloads.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let payloads = app.delivery.payloads.lock().unwrap().clone();
        assert_eq!(payloads[0].name, "w");
        assert_eq!(payloads[0].uris, vec![inserted["uri"].as_str().unwrap().to_owned()]);

        shutdown_tx.send(true).unwrap();
        processor.await.unwrap();
    }
}
