//! The per-invocation agent state and its constituent records.
//!
//! The whole state is serializable: a HITL pause serializes it into the
//! checkpoint store keyed by `thread_id`, and resume rehydrates it on a
//! separate request.

use serde::{Deserialize, Serialize};

use quill_domain::paper::Chunk;
use quill_domain::stream::ProposalPaper;

use crate::security::ScanResult;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A prior conversation message projected from the turn store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    OutOfScope,
    Execute,
    Direct,
}

/// A tool call requested by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    /// Raw JSON string of the tool arguments; parsed by the executor.
    #[serde(default)]
    pub tool_args_json: String,
}

/// Output of the classify-and-route LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Scope relevance, 0-100.
    pub scope_score: u8,
    #[serde(default)]
    pub reasoning: String,
}

impl ClassificationResult {
    pub fn direct(scope_score: u8, reasoning: impl Into<String>) -> Self {
        Self {
            intent: Intent::Direct,
            tool_calls: Vec::new(),
            scope_score,
            reasoning: reasoning.into(),
        }
    }
}

/// Output of the evaluate-batch LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEvaluation {
    pub sufficient: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub suggested_rewrite: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One executed tool call, as the router later reasons about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_name: String,
    pub tool_args: serde_json::Value,
    pub success: bool,
    #[serde(default)]
    pub result_summary: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// A non-chunk tool result kept for the generator. Append-only across
/// iterations: the generator sees every non-retrieve result this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_name: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub prompt_text: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pause / resume
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Set by the executor when a pause-inducing tool succeeds; triggers
/// the HITL interrupt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PauseReason {
    #[serde(default)]
    pub papers: Vec<ProposalPaper>,
    #[serde(default)]
    pub proposed_ids: Vec<String>,
}

/// The user's decision supplied on resume.
#[derive(Debug, Clone)]
pub struct ResumeDecision {
    pub approved: bool,
    pub selected_ids: Vec<String>,
    /// Report of the inline ingestion run when the user approved.
    pub ingest_summary: Option<serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metadata bag
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMeta {
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    /// Scope score of the first classification this turn.
    #[serde(default)]
    pub guardrail_score: Option<u8>,
    /// Scope score carried in from the previous stored turn.
    #[serde(default)]
    pub last_guardrail_score: Option<u8>,
    pub guardrail_threshold: u8,
    pub top_k: usize,
    #[serde(default)]
    pub injection_scan: Option<ScanResult>,
    /// Fingerprints of the previous iteration's retrieved chunks.
    #[serde(default)]
    pub previous_chunk_fingerprints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable state owned by the graph loop for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Conversation messages including the current user message; the
    /// final assistant answer is appended by generation.
    pub messages: Vec<ConversationMessage>,
    pub original_query: String,
    pub rewritten_query: Option<String>,
    pub status: AgentStatus,
    /// Incremented once per classify-and-route entry.
    pub iteration: u32,
    pub max_iterations: u32,
    pub classification_result: Option<ClassificationResult>,
    /// The decision the executor acts on (same record the classifier
    /// produced; kept separately so the executor never re-reads a
    /// stale classification after a rewrite loop).
    pub router_decision: Option<ClassificationResult>,
    /// Append-only across the whole turn.
    pub tool_history: Vec<ToolExecution>,
    pub last_executed_tools: Vec<String>,
    pub retrieved_chunks: Vec<Chunk>,
    pub relevant_chunks: Vec<Chunk>,
    /// Append-only; non-chunk tool results for the generator.
    pub tool_outputs: Vec<ToolOutput>,
    pub evaluation_result: Option<BatchEvaluation>,
    /// Read-only snapshot of prior turns, bounded by the window.
    pub conversation_history: Vec<ConversationMessage>,
    pub retrieval_attempts: u32,
    pub meta: AgentMeta,
    pub pause_reason: Option<PauseReason>,
    pub session_id: String,
    pub thread_id: String,
}

impl AgentState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query: &str,
        session_id: &str,
        thread_id: &str,
        conversation_history: Vec<ConversationMessage>,
        last_guardrail_score: Option<u8>,
        guardrail_threshold: u8,
        top_k: usize,
        max_iterations: u32,
    ) -> Self {
        Self {
            messages: vec![ConversationMessage::user(query)],
            original_query: query.to_string(),
            rewritten_query: None,
            status: AgentStatus::Running,
            iteration: 0,
            max_iterations,
            classification_result: None,
            router_decision: None,
            tool_history: Vec::new(),
            last_executed_tools: Vec::new(),
            retrieved_chunks: Vec::new(),
            relevant_chunks: Vec::new(),
            tool_outputs: Vec::new(),
            evaluation_result: None,
            conversation_history,
            retrieval_attempts: 0,
            meta: AgentMeta {
                guardrail_threshold,
                top_k,
                last_guardrail_score,
                ..Default::default()
            },
            pause_reason: None,
            session_id: session_id.to_string(),
            thread_id: thread_id.to_string(),
        }
    }

    /// The query driving this iteration: rewritten wins over original;
    /// an empty original falls back to the last user message.
    pub fn current_query(&self) -> String {
        if let Some(rw) = &self.rewritten_query {
            if !rw.is_empty() {
                return rw.clone();
            }
        }
        if !self.original_query.is_empty() {
            return self.original_query.clone();
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// The final assistant answer, when generation has run.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .map(|m| m.content.as_str())
    }

    pub fn push_reasoning(&mut self, step: impl Into<String>) {
        self.meta.reasoning_steps.push(step.into());
    }
}

/// Sorted fingerprints for stagnation detection: `"{arxiv_id}:{first
/// 100 chars of chunk_text}"` per chunk.
pub fn chunk_fingerprints(chunks: &[Chunk]) -> Vec<String> {
    let mut prints: Vec<String> = chunks
        .iter()
        .map(|c| {
            let head: String = c.chunk_text.chars().take(100).collect();
            format!("{}:{}", c.arxiv_id, head)
        })
        .collect();
    prints.sort();
    prints
}
