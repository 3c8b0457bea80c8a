use std::sync::Arc;

use quill_domain::config::Config;

use crate::runtime::{IdempotencyStore, StreamService, TaskRegistry};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The stream service owns the per-request orchestration wiring.
    pub streams: Arc<StreamService>,
    /// In-flight runs keyed by session, for cancellation.
    pub tasks: Arc<TaskRegistry>,
    /// TTL map backing the optional `Idempotency-Key` header.
    pub idempotency: Arc<IdempotencyStore>,
    /// SHA-256 of the API bearer token; `None` = dev mode (no auth).
    pub api_token_hash: Option<Vec<u8>>,
}
