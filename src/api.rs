// src/api.rs
//! Operator controls and dashboard snapshot over HTTP.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::config::WatchSection;
use crate::error::ConfigError;
use crate::render::{Board, BoardSnapshot, Renderer, StatusLevel, StatusMessage};
use crate::scheduler::{SchedulerState, Session, IDLE_HINT};
use crate::source::SearchRequest;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub board: Board,
    /// Fallbacks for fields a control request leaves out.
    pub defaults: WatchSection,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/config", put(update_config))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ControlReq {
    #[serde(default)]
    pub keyword: String,
    pub interval_secs: Option<u64>,
    pub strict_filter: Option<bool>,
    pub limit: Option<usize>,
    pub phrase_match: Option<bool>,
}

impl ControlReq {
    fn into_request(self, defaults: &WatchSection) -> Result<SearchRequest, ConfigError> {
        let mut settings = defaults.clone();
        if let Some(v) = self.interval_secs {
            settings.interval_secs = v;
        }
        if let Some(v) = self.strict_filter {
            settings.strict_filter = v;
        }
        if let Some(v) = self.limit {
            settings.limit = v;
        }
        if let Some(v) = self.phrase_match {
            settings.phrase_match = v;
        }
        settings.request(&self.keyword)
    }
}

#[derive(Serialize)]
struct StatusResp {
    state: SchedulerState,
    request: Option<SearchRequest>,
    #[serde(flatten)]
    board: BoardSnapshot,
}

enum ApiError {
    Invalid(ConfigError),
    NotPolling,
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self::Invalid(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            ApiError::Invalid(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::NotPolling => (
                StatusCode::CONFLICT,
                "not polling; use POST /start".to_string(),
            ),
        };
        (code, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

async fn snapshot(state: &AppState) -> StatusResp {
    StatusResp {
        state: state.session.state().await,
        request: state.session.current_request().await,
        board: state.board.snapshot(),
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusResp> {
    Json(snapshot(&state).await)
}

async fn start(
    State(state): State<AppState>,
    Json(body): Json<ControlReq>,
) -> Result<Json<StatusResp>, ApiError> {
    if body.keyword.trim().is_empty() {
        if state.session.clear_keyword().await {
            state.board.clear_progress();
        }
        state
            .board
            .publish_status(&StatusMessage {
                level: StatusLevel::Warning,
                text: IDLE_HINT.to_string(),
            })
            .await;
    }
    let request = body.into_request(&state.defaults)?;
    state.session.start(request).await;
    Ok(Json(snapshot(&state).await))
}

async fn stop(State(state): State<AppState>) -> Json<StatusResp> {
    if state.session.stop().await {
        state.board.clear_progress();
    }
    Json(snapshot(&state).await)
}

async fn update_config(
    State(state): State<AppState>,
    Json(body): Json<ControlReq>,
) -> Result<Json<StatusResp>, ApiError> {
    if body.keyword.trim().is_empty() {
        if state.session.clear_keyword().await {
            state.board.clear_progress();
        }
        return Ok(Json(snapshot(&state).await));
    }
    let request = body.into_request(&state.defaults)?;
    if !state.session.update_config(request).await {
        return Err(ApiError::NotPolling);
    }
    Ok(Json(snapshot(&state).await))
}
