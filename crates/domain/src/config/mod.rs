//! Layered configuration loaded from a TOML file.
//!
//! Every field has a serde default so an empty file (or no file at all)
//! yields a working dev configuration.

mod agent;
mod llm;
mod registry;
mod search;
mod server;
mod storage;

pub use agent::AgentConfig;
pub use llm::{EmbeddingsConfig, LlmConfig, ProviderConfig};
pub use registry::RegistryConfig;
pub use search::SearchConfig;
pub use server::{AuthConfig, ServerConfig};
pub use storage::StorageConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Config {
    /// Load configuration from a TOML file. A missing file is not an
    /// error (defaults apply) but a malformed file is.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }
}
