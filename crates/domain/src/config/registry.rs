use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Paper registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The external paper registry (arXiv-like) the search and ingest
/// tools talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Fixed politeness delay between successive registry calls.
    #[serde(default = "d_delay_ms")]
    pub politeness_delay_ms: u64,
    /// Bounded retries for transient registry failures.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout against the registry.
    #[serde(default = "d_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            politeness_delay_ms: d_delay_ms(),
            max_retries: d_max_retries(),
            timeout_seconds: d_timeout(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://registry.quill.local/api/v1".into()
}
fn d_delay_ms() -> u64 {
    3000
}
fn d_max_retries() -> u32 {
    3
}
fn d_timeout() -> u64 {
    30
}
