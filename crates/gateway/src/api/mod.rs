pub mod auth;
pub mod conversations;
pub mod stream;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// The health probe is public; everything else sits behind the
/// bearer-token middleware (a no-op in dev mode).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health));

    let protected = Router::new()
        .route("/stream", post(stream::stream))
        .route("/conversations", get(conversations::list_conversations))
        .route(
            "/conversations/:session_id",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/:session_id",
            delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/:session_id/cancel",
            post(conversations::cancel_stream),
        )
        .layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
