//! Shared doubles for graph integration tests: a scripted LLM and
//! in-memory tools with controllable results.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;

use quill_agent::format::ConversationFormatter;
use quill_agent::tools::{Tool, ToolInvocation, ToolRegistry, ToolResult};
use quill_agent::{AgentContext, CheckpointStore, Graph};
use quill_domain::error::{Error, Result};
use quill_domain::paper::Chunk;
use quill_domain::stream::BoxStream;
use quill_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replays scripted responses: `chat` pops JSON strings (structured
/// decisions), `chat_stream` pops token lists (answers).
pub struct ScriptedLlm {
    chat_responses: Mutex<VecDeque<String>>,
    stream_responses: Mutex<VecDeque<Vec<String>>>,
    pub chat_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    token_delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new(chat: Vec<String>, streams: Vec<Vec<&str>>) -> Self {
        Self {
            chat_responses: Mutex::new(chat.into_iter().collect()),
            stream_responses: Mutex::new(
                streams
                    .into_iter()
                    .map(|tokens| tokens.into_iter().map(String::from).collect())
                    .collect(),
            ),
            chat_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            token_delay: None,
        }
    }

    /// Insert a delay between streamed tokens (for cancellation tests).
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    pub fn chat_call_count(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .chat_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Provider {
                provider: "scripted".into(),
                message: "chat script exhausted".into(),
            })?;
        Ok(ChatResponse {
            content,
            usage: None,
            model: "scripted-model".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ProviderEvent>>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let tokens = self
            .stream_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec!["ok".into()]);
        let delay = self.token_delay;

        let mut events: Vec<Result<ProviderEvent>> = tokens
            .into_iter()
            .map(|text| Ok(ProviderEvent::Token { text }))
            .collect();
        events.push(Ok(ProviderEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        }));

        let stream = futures_util::stream::iter(events).then(move |event| async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            event
        });
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fake tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn chunk(arxiv_id: &str, text: &str) -> Chunk {
    Chunk {
        chunk_id: format!("{arxiv_id}:{}", &text[..text.len().min(12)]),
        arxiv_id: arxiv_id.into(),
        title: format!("Paper {arxiv_id}"),
        authors: vec!["A. Author".into()],
        chunk_text: text.into(),
        section_name: Some("Body".into()),
        page_number: None,
        score: 0.9,
        pdf_url: format!("https://arxiv.org/pdf/{arxiv_id}.pdf"),
        published_date: Some("2024-01-01".into()),
    }
}

/// Chunk-producing retrieval double: pops one batch per call.
pub struct FakeRetrieveTool {
    batches: Mutex<VecDeque<Vec<Chunk>>>,
    pub calls: AtomicUsize,
}

impl FakeRetrieveTool {
    pub fn new(batches: Vec<Vec<Chunk>>) -> Self {
        Self {
            batches: Mutex::new(batches.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Tool for FakeRetrieveTool {
    fn name(&self) -> &'static str {
        "retrieve_chunks"
    }
    fn description(&self) -> &'static str {
        "Search the knowledge base."
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }
    fn extends_chunks(&self) -> bool {
        true
    }
    async fn execute(&self, _args: Value, _inv: &ToolInvocation<'_>) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let batch = self
            .batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        ToolResult::ok_chunks("retrieve_chunks", batch)
    }
}

/// Registry-search double returning fixed paper metadata.
pub struct FakeSearchTool {
    pub calls: AtomicUsize,
}

impl FakeSearchTool {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Tool for FakeSearchTool {
    fn name(&self) -> &'static str {
        "arxiv_search"
    }
    fn description(&self) -> &'static str {
        "Search the registry."
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }
    async fn execute(&self, _args: Value, _inv: &ToolInvocation<'_>) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = serde_json::json!({
            "count": 2,
            "papers": [
                {"arxiv_id": "A1", "title": "First Paper", "authors": ["A"],
                 "abstract": "About attention.", "published_date": "2024-01-01",
                 "pdf_url": "https://arxiv.org/pdf/A1.pdf"},
                {"arxiv_id": "A2", "title": "Second Paper", "authors": ["B"],
                 "abstract": "About retrieval.", "published_date": "2024-01-02",
                 "pdf_url": "https://arxiv.org/pdf/A2.pdf"},
            ],
        });
        ToolResult::ok_value("arxiv_search", data, Some("Found 2 papers".into()))
    }
}

/// Misconfigured tool: claims to produce chunks but returns a map.
pub struct LyingChunkTool;

#[async_trait::async_trait]
impl Tool for LyingChunkTool {
    fn name(&self) -> &'static str {
        "retrieve_chunks"
    }
    fn description(&self) -> &'static str {
        "Claims chunks, returns a map."
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    fn extends_chunks(&self) -> bool {
        true
    }
    async fn execute(&self, _args: Value, _inv: &ToolInvocation<'_>) -> ToolResult {
        ToolResult::ok_value("retrieve_chunks", serde_json::json!({"oops": true}), None)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn context(llm: Arc<ScriptedLlm>, tools: ToolRegistry) -> Arc<AgentContext> {
    Arc::new(AgentContext {
        llm,
        provider_name: "scripted".into(),
        model: "scripted-model".into(),
        tools,
        formatter: ConversationFormatter::default(),
        guardrail_threshold: 75,
        top_k: 3,
        max_retrieval_attempts: 3,
        max_iterations: 5,
        temperature: 0.3,
        max_generation_tokens: 512,
        llm_timeout: Duration::from_secs(5),
    })
}

pub fn graph(ctx: Arc<AgentContext>) -> (Graph, Arc<CheckpointStore>) {
    let checkpoints = Arc::new(CheckpointStore::new(Duration::from_secs(60)));
    (Graph::new(ctx, checkpoints.clone()), checkpoints)
}

/// JSON script line for an `execute` classification.
pub fn classify_execute(score: u8, tool: &str, args: &str) -> String {
    serde_json::json!({
        "intent": "execute",
        "scope_score": score,
        "tool_calls": [{"tool_name": tool, "tool_args_json": args}],
        "reasoning": "scripted",
    })
    .to_string()
}

/// JSON script line for a `direct` classification.
pub fn classify_direct(score: u8) -> String {
    serde_json::json!({
        "intent": "direct",
        "scope_score": score,
        "tool_calls": [],
        "reasoning": "scripted",
    })
    .to_string()
}

/// JSON script line for an evaluation verdict.
pub fn evaluation(sufficient: bool, rewrite: Option<&str>) -> String {
    serde_json::json!({
        "sufficient": sufficient,
        "reasoning": "scripted",
        "suggested_rewrite": rewrite,
    })
    .to_string()
}
