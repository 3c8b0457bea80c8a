//! Conversation management endpoints.
//!
//! - `GET    /conversations`                    — paginated listing
//! - `GET    /conversations/:session_id`        — full conversation with turns
//! - `DELETE /conversations/:session_id`        — cascade delete
//! - `POST   /conversations/:session_id/cancel` — cancel the active stream

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::auth::current_user_id;
use crate::runtime::Acquired;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_limit() -> usize {
    20
}

/// Standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let user_id = current_user_id(&headers);
    let limit = query.limit.clamp(1, 100);

    match state
        .streams
        .conversations
        .list(query.offset, limit, &user_id)
        .await
    {
        Ok((items, total)) => Json(serde_json::json!({
            "total": total,
            "offset": query.offset,
            "limit": limit,
            "conversations": items,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "conversation listing failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /conversations/:session_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = current_user_id(&headers);

    match state
        .streams
        .conversations
        .get_with_turns(&session_id, &user_id)
        .await
    {
        Ok(Some((conversation, turns))) => Json(serde_json::json!({
            "session_id": conversation.session_id,
            "title": conversation.title,
            "created_at": conversation.created_at,
            "updated_at": conversation.updated_at,
            "turn_count": turns.len(),
            "turns": turns,
        }))
        .into_response(),
        // Not-owned and not-found are indistinguishable on purpose.
        Ok(None) => api_error(StatusCode::NOT_FOUND, "conversation not found"),
        Err(e) => {
            tracing::error!(error = %e, "conversation fetch failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /conversations/:session_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    let user_id = current_user_id(&headers);

    match state
        .streams
        .conversations
        .delete(&session_id, &user_id)
        .await
    {
        Ok(Some(turns_deleted)) => Json(serde_json::json!({
            "session_id": session_id,
            "turns_deleted": turns_deleted,
        }))
        .into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "conversation not found"),
        Err(e) => {
            tracing::error!(error = %e, "conversation delete failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /conversations/:session_id/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    // Optional idempotency: repeated cancels with the same key replay
    // the first response.
    let idem_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if let Some(key) = &idem_key {
        match state.idempotency.acquire(key) {
            Acquired::Completed(Some(cached)) => return Json(cached).into_response(),
            Acquired::Completed(None) | Acquired::InProgress => {
                return Json(serde_json::json!({
                    "cancelled": false,
                    "message": "cancellation already in progress",
                }))
                .into_response();
            }
            Acquired::New => {}
        }
    }

    let cancelled = state.tasks.cancel(&session_id);
    let response = serde_json::json!({
        "cancelled": cancelled,
        "message": if cancelled {
            "stream cancellation requested"
        } else {
            "no active stream for this session"
        },
    });

    if let Some(key) = &idem_key {
        state.idempotency.complete(key, response.clone());
    }

    tracing::info!(session_id = %session_id, cancelled, "cancel requested");
    Json(response).into_response()
}
