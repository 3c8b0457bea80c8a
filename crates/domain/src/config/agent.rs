use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Server-side defaults for the per-request agent tunables. Each of
/// these can be overridden per stream request within validated ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Minimum scope score (0-100) for a query to be considered in scope.
    #[serde(default = "d_threshold")]
    pub guardrail_threshold: u8,
    /// Chunks surfaced to generation and in `sources` events.
    #[serde(default = "d_top_k")]
    pub top_k: usize,
    /// Maximum retrieval attempts before generation proceeds with gaps.
    #[serde(default = "d_attempts")]
    pub max_retrieval_attempts: u32,
    /// Hard bound on classify-and-route visits per turn.
    #[serde(default = "d_iterations")]
    pub max_iterations: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Prior turns loaded as conversation context.
    #[serde(default = "d_window")]
    pub conversation_window: usize,
    /// Cap on generated answer tokens.
    #[serde(default = "d_gen_tokens")]
    pub max_generation_tokens: u32,
    /// How long a HITL checkpoint survives before resume fails.
    #[serde(default = "d_checkpoint_ttl")]
    pub checkpoint_ttl_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            guardrail_threshold: d_threshold(),
            top_k: d_top_k(),
            max_retrieval_attempts: d_attempts(),
            max_iterations: d_iterations(),
            temperature: d_temperature(),
            conversation_window: d_window(),
            max_generation_tokens: d_gen_tokens(),
            checkpoint_ttl_seconds: d_checkpoint_ttl(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_threshold() -> u8 {
    75
}
fn d_top_k() -> usize {
    3
}
fn d_attempts() -> u32 {
    3
}
fn d_iterations() -> u32 {
    5
}
fn d_temperature() -> f32 {
    0.3
}
fn d_window() -> usize {
    5
}
fn d_gen_tokens() -> u32 {
    2048
}
fn d_checkpoint_ttl() -> u64 {
    900
}
