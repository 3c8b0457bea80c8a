//! The external SSE event contract.
//!
//! Every streaming request produces an ordered sequence of these events.
//! Ordering guarantees: the first event is a `status`, `metadata` follows
//! all `content` tokens, and `done` is always last, including error paths.

use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::paper::SourceInfo;

/// A boxed async stream, used for LLM token streaming.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Workflow progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub step: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// One generated answer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentData {
    pub token: String,
}

/// Retrieved document sources, emitted once per turn after evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesData {
    pub sources: Vec<SourceInfo>,
}

/// Final execution metadata, emitted immediately before `done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataData {
    pub query: String,
    pub execution_time_ms: f64,
    pub retrieval_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_score: Option<u8>,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub turn_number: i64,
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// In-band stream error. The stream still ends with `done` after this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Citation graph surfaced from the citation-exploration tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationsData {
    pub arxiv_id: String,
    pub title: String,
    #[serde(default)]
    pub references: Vec<String>,
    /// Always derived from `references.len()`, never stored independently.
    pub reference_count: usize,
}

impl CitationsData {
    pub fn new(arxiv_id: String, title: String, references: Vec<String>) -> Self {
        let reference_count = references.len();
        Self {
            arxiv_id,
            title,
            references,
            reference_count,
        }
    }
}

/// A single paper proposed for ingestion pending user confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalPaper {
    pub arxiv_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub published_date: Option<String>,
    pub pdf_url: String,
}

/// Human-in-the-loop confirmation request; the stream ends after this
/// (plus `metadata` and `done`) and resumes on a separate request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmIngestData {
    pub papers: Vec<ProposalPaper>,
    pub session_id: String,
    pub thread_id: String,
}

/// Ingestion finished during a HITL resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestCompleteData {
    pub papers_processed: usize,
    pub chunks_created: usize,
    pub duration_seconds: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The event enum
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An SSE event as sent to the client: `event: <name>\ndata: <json>\n\n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Status(StatusData),
    Content(ContentData),
    Sources(SourcesData),
    Metadata(MetadataData),
    Error(ErrorData),
    Citations(CitationsData),
    ConfirmIngest(ConfirmIngestData),
    IngestComplete(IngestCompleteData),
    Done,
}

impl StreamEvent {
    /// The SSE `event:` field name.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Status(_) => "status",
            StreamEvent::Content(_) => "content",
            StreamEvent::Sources(_) => "sources",
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::Error(_) => "error",
            StreamEvent::Citations(_) => "citations",
            StreamEvent::ConfirmIngest(_) => "confirm_ingest",
            StreamEvent::IngestComplete(_) => "ingest_complete",
            StreamEvent::Done => "done",
        }
    }

    /// The SSE `data:` field payload. `done` carries an empty object.
    pub fn data_json(&self) -> serde_json::Value {
        match self {
            StreamEvent::Status(d) => serde_json::to_value(d),
            StreamEvent::Content(d) => serde_json::to_value(d),
            StreamEvent::Sources(d) => serde_json::to_value(d),
            StreamEvent::Metadata(d) => serde_json::to_value(d),
            StreamEvent::Error(d) => serde_json::to_value(d),
            StreamEvent::Citations(d) => serde_json::to_value(d),
            StreamEvent::ConfirmIngest(d) => serde_json::to_value(d),
            StreamEvent::IngestComplete(d) => serde_json::to_value(d),
            StreamEvent::Done => Ok(serde_json::json!({})),
        }
        .unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Convenience constructor for a plain status event.
    pub fn status(step: impl Into<String>, message: impl Into<String>) -> Self {
        StreamEvent::Status(StatusData {
            step: step.into(),
            message: message.into(),
            details: None,
        })
    }

    /// Status event with a details payload.
    pub fn status_with(
        step: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        StreamEvent::Status(StatusData {
            step: step.into(),
            message: message.into(),
            details: Some(details),
        })
    }

    pub fn error(error: impl Into<String>, code: Option<&str>) -> Self {
        StreamEvent::Error(ErrorData {
            error: error.into(),
            code: code.map(String::from),
        })
    }
}
