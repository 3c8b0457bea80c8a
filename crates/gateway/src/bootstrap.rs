//! Wires configuration into the shared application state and runs the
//! HTTP server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tower_http::trace::TraceLayer;

use quill_agent::CheckpointStore;
use quill_domain::config::Config;
use quill_domain::error::{Error, Result};
use quill_ingest::IngestService;
use quill_papers::{Chunker, PlainTextParser, RegistryClient};
use quill_providers::{EmbeddingsClient, ProviderRegistry};
use quill_store::{ChunkStore, ConversationStore, Db, PaperStore};

use crate::runtime::{IdempotencyStore, StreamService, TaskRegistry};
use crate::state::AppState;

/// TTL for idempotency keys on mutating endpoints.
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(30 * 60);

/// Assemble the application state from configuration.
pub fn build_state(config: Config) -> Result<AppState> {
    let config = Arc::new(config);

    // ── Persistence ────────────────────────────────────────────────
    let db = Db::open(Path::new(&config.storage.database_path))?;
    let conversations = ConversationStore::new(db.clone());
    let papers = PaperStore::new(db.clone());
    let chunks = ChunkStore::new(db);

    // ── Providers ──────────────────────────────────────────────────
    let llm = Arc::new(ProviderRegistry::from_config(&config.llm));
    let llm_timeout = Duration::from_secs_f64(config.llm.timeout_seconds.max(1.0));
    let embedder = Arc::new(EmbeddingsClient::from_config(
        &config.llm.embeddings,
        llm_timeout,
    )?);

    // ── Paper acquisition ──────────────────────────────────────────
    let registry_client = Arc::new(RegistryClient::from_config(&config.registry)?);
    let ingest = Arc::new(IngestService::new(
        registry_client.clone(),
        Arc::new(PlainTextParser),
        embedder.clone(),
        Chunker::default(),
        papers.clone(),
        chunks.clone(),
    ));

    // ── Runtime stores ─────────────────────────────────────────────
    let checkpoints = Arc::new(CheckpointStore::new(Duration::from_secs(
        config.agent.checkpoint_ttl_seconds,
    )));
    let tasks = Arc::new(TaskRegistry::new());

    let streams = Arc::new(StreamService {
        llm,
        embedder,
        search_config: config.search.clone(),
        chunks,
        papers,
        conversations,
        registry_client: Some(registry_client),
        ingest: Some(ingest),
        checkpoints,
        tasks: tasks.clone(),
        defaults: config.agent.clone(),
        llm_timeout,
    });

    // ── Auth (startup-computed) ────────────────────────────────────
    let api_token_hash = match std::env::var(&config.auth.api_token_env) {
        Ok(token) if !token.is_empty() => {
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env = %config.auth.api_token_env,
                "no API token configured; running without authentication"
            );
            None
        }
    };

    Ok(AppState {
        config,
        streams,
        tasks,
        idempotency: Arc::new(IdempotencyStore::new(IDEMPOTENCY_TTL)),
        api_token_hash,
    })
}

/// Run the HTTP server until shutdown.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = crate::api::router(state.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "gateway listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Other(format!("server error: {e}")))
}
