//! API authentication middleware and user resolution.
//!
//! The bearer token is read from the env var named by
//! `config.auth.api_token_env` **once at startup** and cached as a
//! SHA-256 digest in `AppState`. An unset or empty env var means dev
//! mode (logged once, no auth enforced). Requests identify their user
//! via the `X-User-Id` header; absent headers map to the default
//! single-tenant user so every store operation stays owner-scoped.

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::extract::State;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Owner used when a request carries no `X-User-Id`.
pub const DEFAULT_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Resolve the requesting user's ID from headers.
pub fn current_user_id(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_USER_ID)
        .to_string()
}

/// Axum middleware enforcing bearer-token authentication on protected
/// routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // `api_token_hash` is `None` in dev mode (no token configured).
    let expected_hash = match &state.api_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    // Compare fixed-length digests in constant time; this also avoids
    // leaking the token length.
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_header_maps_to_default_user() {
        assert_eq!(current_user_id(&HeaderMap::new()), DEFAULT_USER_ID);
    }

    #[test]
    fn explicit_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user-42"));
        assert_eq!(current_user_id(&headers), "user-42");
    }

    #[test]
    fn empty_header_maps_to_default_user() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static(""));
        assert_eq!(current_user_id(&headers), DEFAULT_USER_ID);
    }
}
