//! Stream API endpoint.
//!
//! - `POST /stream` — SSE: ask a question or resume a paused HITL
//!   confirmation. Exactly one of `query` / `resume` must be set.
//!
//! Validation failures reject with 4xx before the stream opens; once
//! streaming, errors are in-band `error` events and the response stays
//! HTTP 200.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use quill_domain::stream::StreamEvent;

use crate::api::auth::current_user_id;
use crate::runtime::{ResumeOptions, StreamOptions};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ResumeBody {
    pub session_id: String,
    pub thread_id: String,
    pub approved: bool,
    #[serde(default)]
    pub selected_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub resume: Option<ResumeBody>,

    // LLM selection
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,

    // Agent parameters
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub guardrail_threshold: Option<u8>,
    #[serde(default)]
    pub max_retrieval_attempts: Option<u32>,
    #[serde(default)]
    pub max_iterations: Option<u32>,

    // Generation parameters
    #[serde(default)]
    pub temperature: Option<f32>,

    // Request lifecycle
    #[serde(default)]
    pub timeout_seconds: Option<f64>,

    // Conversation parameters
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_window: Option<usize>,
}

/// Validate ranges and the query/resume exclusivity. Returns the
/// normalized options or a client-facing message.
fn validate(req: &StreamRequest, state: &AppState) -> Result<ValidatedRequest, String> {
    match (&req.query, &req.resume) {
        (Some(_), Some(_)) => return Err("Provide either 'query' or 'resume', not both.".into()),
        (None, None) => return Err("Provide either 'query' or 'resume'.".into()),
        _ => {}
    }

    if let Some(q) = &req.query {
        if q.trim().is_empty() {
            return Err("'query' must be a non-empty string.".into());
        }
    }

    check_range("top_k", req.top_k, 1, 10)?;
    check_range("guardrail_threshold", req.guardrail_threshold.map(usize::from), 0, 100)?;
    check_range(
        "max_retrieval_attempts",
        req.max_retrieval_attempts.map(|v| v as usize),
        1,
        5,
    )?;
    check_range("max_iterations", req.max_iterations.map(|v| v as usize), 1, 20)?;
    check_range("conversation_window", req.conversation_window, 1, 10)?;
    if let Some(t) = req.temperature {
        if !(0.0..=1.0).contains(&t) {
            return Err("temperature must be within [0, 1]".into());
        }
    }
    if let Some(t) = req.timeout_seconds {
        if !(10.0..=600.0).contains(&t) {
            return Err("timeout_seconds must be within [10, 600]".into());
        }
    }

    let defaults = &state.config.agent;
    if let Some(resume) = &req.resume {
        return Ok(ValidatedRequest::Resume(ResumeOptions {
            session_id: resume.session_id.clone(),
            thread_id: resume.thread_id.clone(),
            approved: resume.approved,
            selected_ids: resume.selected_ids.clone(),
        }));
    }

    Ok(ValidatedRequest::Ask(StreamOptions {
        query: req.query.clone().unwrap_or_default(),
        provider: req.provider.clone(),
        model: req.model.clone(),
        top_k: req.top_k.unwrap_or(defaults.top_k),
        guardrail_threshold: req
            .guardrail_threshold
            .unwrap_or(defaults.guardrail_threshold),
        max_retrieval_attempts: req
            .max_retrieval_attempts
            .unwrap_or(defaults.max_retrieval_attempts),
        max_iterations: req.max_iterations.unwrap_or(defaults.max_iterations),
        temperature: req.temperature.unwrap_or(defaults.temperature),
        timeout_seconds: req.timeout_seconds,
        session_id: req.session_id.clone(),
        conversation_window: req
            .conversation_window
            .unwrap_or(defaults.conversation_window),
    }))
}

enum ValidatedRequest {
    Ask(StreamOptions),
    Resume(ResumeOptions),
}

fn check_range(
    field: &str,
    value: Option<usize>,
    min: usize,
    max: usize,
) -> Result<(), String> {
    match value {
        Some(v) if v < min || v > max => {
            Err(format!("{field} must be within [{min}, {max}]"))
        }
        _ => Ok(()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StreamRequest>,
) -> Response {
    // Pre-flight: reject early when no LLM providers are configured.
    if state.streams.llm.is_empty() {
        return (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "error": "no_llm_provider",
                "reason": "No LLM providers are available. Configure at least one \
                           provider under [llm.providers] in the config file.",
            })),
        )
            .into_response();
    }

    let validated = match validate(&body, &state) {
        Ok(v) => v,
        Err(message) => {
            return (
                axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response();
        }
    };

    let user_id = current_user_id(&headers);
    let rx = match validated {
        ValidatedRequest::Ask(opts) => state.streams.ask_stream(opts, user_id),
        ValidatedRequest::Resume(opts) => state.streams.resume_stream(opts, user_id),
    };

    let mut response = Sse::new(make_sse_stream(rx))
        .keep_alive(KeepAlive::default())
        .into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        axum::http::HeaderValue::from_static("no-cache"),
    );
    response
}

fn make_sse_stream(
    mut rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok(Event::default()
                .event(event.name())
                .data(event.data_json().to_string()));
        }
    }
}
