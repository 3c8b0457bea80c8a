use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One OpenAI-compatible provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Env var holding the API key. Keys never live in the config file.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "d_model")]
    pub default_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider used when the request does not name one.
    #[serde(default = "d_default_provider")]
    pub default_provider: String,
    /// Per-call timeout for LLM requests.
    #[serde(default = "d_timeout")]
    pub timeout_seconds: f64,
    /// Named provider endpoints. BTreeMap keeps listing order stable.
    #[serde(default = "d_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: d_default_provider(),
            timeout_seconds: d_timeout(),
            providers: d_providers(),
            embeddings: EmbeddingsConfig::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Embeddings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "d_embed_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "d_embed_model")]
    pub model: String,
    /// Expected vector dimension; mismatched responses are rejected.
    #[serde(default = "d_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: d_embed_url(),
            api_key_env: None,
            model: d_embed_model(),
            dimension: d_dimension(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_default_provider() -> String {
    "openai".into()
}
fn d_timeout() -> f64 {
    60.0
}
fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_providers() -> BTreeMap<String, ProviderConfig> {
    let mut m = BTreeMap::new();
    m.insert(
        "openai".to_string(),
        ProviderConfig {
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            default_model: d_model(),
        },
    );
    m
}
fn d_embed_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_embed_model() -> String {
    "text-embedding-3-small".into()
}
fn d_dimension() -> usize {
    1536
}
