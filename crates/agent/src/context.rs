//! Per-invocation collaborators and tunables for the graph nodes.

use std::sync::Arc;
use std::time::Duration;

use quill_providers::LlmProvider;

use crate::format::ConversationFormatter;
use crate::tools::ToolRegistry;

/// Everything the nodes need, assembled once per stream request.
pub struct AgentContext {
    pub llm: Arc<dyn LlmProvider>,
    pub provider_name: String,
    pub model: String,
    pub tools: ToolRegistry,
    pub formatter: ConversationFormatter,

    // ── Tunables (validated per-request, defaulted from config) ────
    pub guardrail_threshold: u8,
    pub top_k: usize,
    pub max_retrieval_attempts: u32,
    pub max_iterations: u32,
    pub temperature: f32,
    pub max_generation_tokens: u32,
    pub llm_timeout: Duration,
}
