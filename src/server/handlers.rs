//! Request handlers

use crate::providers::Message;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::storage::DailyDraw;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Body of `/chat` and `/chat/stream`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, alias = "profile_id")]
    pub profile_id: Option<String>,
}

/// Body of `/title`
#[derive(Debug, Deserialize)]
pub struct TitleBody {
    #[serde(default)]
    pub text: Option<String>,
}

/// Body of `/draws/daily` and query of `/draws/today`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawParams {
    #[serde(default, alias = "profile_id")]
    pub profile_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct TitleResponse {
    pub title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub app_id: String,
    pub ws_url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn require_messages(body: &ChatBody) -> Result<(), ApiError> {
    if body.messages.is_empty() {
        return Err(ApiError::bad_request("messages required"));
    }
    Ok(())
}

fn require_profile_id(params: &DrawParams, message: &str) -> Result<String, ApiError> {
    params
        .profile_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(message))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = body?;
    require_messages(&body)?;

    let content = state
        .chat
        .chat(body.messages, body.profile_id.as_deref())
        .await?;
    Ok(Json(ChatResponse { content }))
}

pub async fn chat_stream(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    require_messages(&body)?;

    let events = state
        .chat
        .stream(body.messages, body.profile_id)
        .map(|frame| {
            // `event:` must precede `data:` on the wire
            let event = match frame.event() {
                Some(name) => Event::default().event(name),
                None => Event::default(),
            };
            Ok::<Event, Infallible>(event.data(frame.data()))
        });

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response())
}

pub async fn title(
    State(state): State<AppState>,
    body: Result<Json<TitleBody>, JsonRejection>,
) -> Result<Json<TitleResponse>, ApiError> {
    let Json(body) = body?;
    let text = body.text.unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("text required"));
    }

    let title = state.chat.title(text).await?;
    Ok(Json(TitleResponse { title }))
}

pub async fn handshake(State(state): State<AppState>) -> Result<Json<HandshakeResponse>, ApiError> {
    let endpoint = state.signer.sign()?;
    Ok(Json(HandshakeResponse {
        app_id: state.signer.app_id().to_string(),
        ws_url: endpoint.url,
    }))
}

pub async fn draw_today(
    State(state): State<AppState>,
    params: Result<Query<DrawParams>, QueryRejection>,
) -> Result<Json<DailyDraw>, ApiError> {
    let Query(params) = params?;
    let profile_id = require_profile_id(&params, "profile_id required")?;

    state
        .draws
        .get_today(&profile_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("not found"))
}

pub async fn draw_daily(
    State(state): State<AppState>,
    body: Result<Json<DrawParams>, JsonRejection>,
) -> Result<Json<DailyDraw>, ApiError> {
    let Json(params) = body?;
    let profile_id = require_profile_id(&params, "profileId required")?;

    let draw = state.draws.get_or_create_today(&profile_id).await?;
    Ok(Json(draw))
}
