//! Channel configuration, content and key query handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use hub_core::model::{ChannelConfig, ContentKey, DirectionQuery, TimeQuery, TimeUnit};
use hub_core::storage::Content;
use hub_sdk::objects::{ChannelRequest, InsertedContent, LatestKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListChannelsParams {
    tag: Option<String>,
}

/// `GET /channel`: every channel config, or those carrying `tag`.
pub async fn list_channels(
    State(state): State<AppState>,
    Query(params): Query<ListChannelsParams>,
) -> Result<Json<Vec<ChannelConfig>>, ApiError> {
    let channels = match params.tag {
        Some(tag) => state.channels.get_channels_by_tag(&tag).await?,
        None => state.channels.get_channels().await?,
    };
    Ok(Json(channels))
}

/// `PUT /channel/{name}`: create the channel, or update it keeping its
/// creation date.
pub async fn put_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ChannelRequest>,
) -> Result<Response, ApiError> {
    let existing = state.channels.get_channel_config(&name, false).await?;
    let config = ChannelConfig::from_request(&name, request, state.channels.times().now());
    match existing {
        Some(old) => {
            let config = state.channels.update_channel(config, Some(&old)).await?;
            Ok(Json(config).into_response())
        }
        None => {
            let config = state.channels.create_channel(config).await?;
            Ok((StatusCode::CREATED, Json(config)).into_response())
        }
    }
}

/// `GET /channel/{name}`
pub async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ChannelConfig>, ApiError> {
    state
        .channels
        .get_channel_config(&name, true)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("channel {name} not found")))
}

/// `DELETE /channel/{name}`
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.channels.delete(&name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("channel {name} not found")))
    }
}

/// `POST /channel/{name}`: store the request body under a fresh key.
pub async fn insert_item(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let key = state
        .channels
        .insert(&name, Content::new(content_type, body))
        .await?;
    let inserted = InsertedContent {
        key: key.to_url(),
        uri: state.item_uri(&name, &key),
    };
    Ok((StatusCode::CREATED, Json(inserted)).into_response())
}

/// `GET /channel/{name}/{*key}`: one item with its stored content type.
pub async fn get_item(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let key = parse_key(&key)?;
    let content = state
        .channels
        .get(&name, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("item {key} not found")))?;
    let content_type = content
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], content.data).into_response())
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    #[serde(default = "default_true")]
    stable: bool,
}

/// `GET /channel/{name}/latest`: 404 for an empty channel.
pub async fn latest(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<LatestParams>,
) -> Result<Json<LatestKey>, ApiError> {
    let key = state
        .channels
        .get_latest(&name, params.stable)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("channel {name} is empty")))?;
    Ok(Json(LatestKey { key: key.to_url() }))
}

#[derive(Debug, Deserialize)]
pub struct KeysParams {
    start: Option<String>,
    #[serde(default = "default_count")]
    count: usize,
    #[serde(default = "default_true")]
    next: bool,
    #[serde(default = "default_true")]
    stable: bool,
}

/// Keys and their item URIs, in ascending order.
#[derive(Debug, Serialize)]
pub struct KeysResponse {
    keys: Vec<String>,
    uris: Vec<String>,
}

impl KeysResponse {
    fn new<'a>(
        state: &AppState,
        channel: &str,
        keys: impl Iterator<Item = &'a ContentKey>,
    ) -> Self {
        let (keys, uris) = keys
            .map(|k| (k.to_url(), state.item_uri(channel, k)))
            .unzip();
        Self { keys, uris }
    }
}

/// `GET /channel/{name}/keys?start=&count=&next=&stable=`
///
/// Without `start`, a forward query starts at the beginning of retention
/// and a backward query at the latest key.
pub async fn keys(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<KeysParams>,
) -> Result<Json<KeysResponse>, ApiError> {
    let start = match params.start.as_deref() {
        Some(raw) => parse_key(raw)?,
        None if params.next => ContentKey::first_key(OffsetDateTime::UNIX_EPOCH),
        None => ContentKey::last_key(state.channels.times().latest_limit(params.stable)),
    };
    let query = if params.next {
        DirectionQuery::next(name.as_str(), start, params.count)
    } else {
        DirectionQuery::previous(name.as_str(), start, params.count)
    };
    let keys = state
        .channels
        .get_keys(query.with_stable(params.stable))
        .await?;
    Ok(Json(KeysResponse::new(&state, &name, keys.iter())))
}

#[derive(Debug, Deserialize)]
pub struct TimeParams {
    start: String,
    unit: String,
    #[serde(default = "default_true")]
    stable: bool,
}

/// `GET /channel/{name}/time?start={rfc3339}&unit=hour`: keys of the
/// bucket of `unit` containing `start`.
pub async fn time_bucket(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<TimeParams>,
) -> Result<Json<KeysResponse>, ApiError> {
    let start = OffsetDateTime::parse(&params.start, &Rfc3339)
        .map_err(|e| ApiError::BadRequest(format!("invalid start time: {e}")))?;
    let unit: TimeUnit = params.unit.parse().map_err(ApiError::BadRequest)?;
    let mut query = TimeQuery::new(name.as_str(), unit.truncate(start), unit);
    query.stable = params.stable;
    let keys = state.channels.query_by_time(query).await?;
    Ok(Json(KeysResponse::new(&state, &name, keys.iter())))
}

fn parse_key(raw: &str) -> Result<ContentKey, ApiError> {
    ContentKey::from_url(raw.trim_matches('/'))
        .ok_or_else(|| ApiError::BadRequest(format!("invalid key: {raw}")))
}

fn default_true() -> bool {
    true
}

fn default_count() -> usize {
    10
}
