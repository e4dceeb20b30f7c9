//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ChoiceRequest, ErrorResponse, MessageRequest, SessionResponse};
use super::AppState;
use crate::db::UserId;
use crate::runtime::{SseEvent, Turn};
use crate::state_machine::event::Command;
use crate::state_machine::Event;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Conversation turns
        .route("/api/users/:user_id/messages", post(send_message))
        .route("/api/users/:user_id/choices", post(send_choice))
        // Session inspection
        .route("/api/users/:user_id/session", get(get_session))
        // SSE streaming
        .route("/api/users/:user_id/stream", get(stream_user))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Conversation Turns
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<Turn>, AppError> {
    let user_id = check_user_id(user_id)?;

    // Commands and main-menu labels are decoded once, here
    let event = match Command::parse(&req.text) {
        Some(command) => Event::Command(command),
        None => Event::Text { text: req.text },
    };

    let turn = state
        .runtime
        .send_event(user_id, event)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(turn))
}

async fn send_choice(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<ChoiceRequest>,
) -> Result<Json<Turn>, AppError> {
    let user_id = check_user_id(user_id)?;
    let turn = state
        .runtime
        .send_event(user_id, Event::Choice(req.choice))
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(turn))
}

// ============================================================
// Session
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<SessionResponse>, AppError> {
    let user_id = check_user_id(user_id)?;
    let session = state
        .runtime
        .session(user_id)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(SessionResponse::new(user_id, session)))
}

async fn stream_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = check_user_id(user_id)?;

    // Subscribe before reading the session so no change falls in between
    let broadcast_rx = state
        .runtime
        .subscribe(user_id)
        .await
        .map_err(AppError::Internal)?;

    let session = state
        .runtime
        .session(user_id)
        .await
        .map_err(AppError::Internal)?;

    let init_event = SseEvent::StateChange {
        state: serde_json::to_value(&session).unwrap_or(Value::Null),
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

/// Chat user ids are positive
fn check_user_id(user_id: UserId) -> Result<UserId, AppError> {
    if user_id > 0 {
        Ok(user_id)
    } else {
        Err(AppError::BadRequest(format!("Invalid user id: {user_id}")))
    }
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("fitcoach ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
