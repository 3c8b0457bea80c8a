use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Reciprocal-rank-fusion constant: contributions are `1/(rank + k)`.
    #[serde(default = "d_k_rrf")]
    pub k_rrf: u32,
    /// Hybrid mode over-fetches each backend by this factor before fusing.
    #[serde(default = "d_fetch_multiplier")]
    pub fetch_multiplier: usize,
    /// Minimum similarity for vector hits. `None` keeps everything.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k_rrf: d_k_rrf(),
            fetch_multiplier: d_fetch_multiplier(),
            min_score: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_k_rrf() -> u32 {
    60
}
fn d_fetch_multiplier() -> usize {
    2
}
