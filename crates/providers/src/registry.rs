//! Provider registry: named LLM providers with per-request resolution.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use quill_domain::config::LlmConfig;
use quill_domain::error::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

/// The provider and model a request resolved to.
#[derive(Clone)]
pub struct ResolvedModel {
    pub provider: Arc<dyn LlmProvider>,
    pub provider_name: String,
    pub model: String,
}

/// Name-keyed table of configured LLM providers.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    default_provider: String,
}

impl ProviderRegistry {
    /// Build every configured provider. A provider that fails to build
    /// is skipped with a warning; an empty registry is an error only
    /// when the first request arrives.
    pub fn from_config(cfg: &LlmConfig) -> Self {
        let timeout = Duration::from_secs_f64(cfg.timeout_seconds.max(1.0));
        let mut providers: BTreeMap<String, Arc<dyn LlmProvider>> = BTreeMap::new();

        for (name, pc) in &cfg.providers {
            match OpenAiCompatProvider::from_config(name, pc, timeout) {
                Ok(p) => {
                    providers.insert(name.clone(), Arc::new(p));
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "provider init failed, skipping");
                }
            }
        }

        tracing::info!(providers = providers.len(), "provider registry built");

        Self {
            providers,
            default_provider: cfg.default_provider.clone(),
        }
    }

    /// Registry for tests: a single pre-built provider under `name`.
    pub fn with_provider(name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(name.to_string(), provider);
        Self {
            providers,
            default_provider: name.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve a request's optional provider/model overrides to a
    /// concrete provider instance and model name.
    pub fn resolve(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<ResolvedModel> {
        let name = provider.unwrap_or(&self.default_provider);
        let p = self
            .providers
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown LLM provider: {name}")))?;
        let model = model
            .map(String::from)
            .unwrap_or_else(|| p.default_model().to_string());
        Ok(ResolvedModel {
            provider: p.clone(),
            provider_name: name.to_string(),
            model,
        })
    }
}
