//! Structured output and timeout helpers layered on [`LlmProvider`].

use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use quill_domain::error::{Error, Result};

use crate::traits::{ChatMessage, ChatRequest, LlmProvider};

/// Wrap any provider future with a timeout that surfaces as
/// `Error::Timeout` carrying the provider name and budget.
pub async fn with_llm_timeout<T, F>(provider: &str, budget: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            provider: provider.to_string(),
            seconds: budget.as_secs_f64(),
        }),
    }
}

/// One structured-output call: ask the model for JSON, strip any code
/// fences, and deserialize into `T`. Used by both LLM-bearing decision
/// nodes (classification and batch evaluation).
pub async fn generate_structured<T: DeserializeOwned>(
    provider: &dyn LlmProvider,
    system: &str,
    user: &str,
    model: Option<String>,
    timeout: Duration,
) -> Result<T> {
    let req = ChatRequest {
        messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
        temperature: Some(0.0),
        max_tokens: None,
        json_mode: true,
        model,
    };

    let resp = with_llm_timeout(provider.provider_id(), timeout, provider.chat(&req)).await?;

    let cleaned = strip_code_fences(&resp.content);
    serde_json::from_str(cleaned).map_err(|e| {
        let preview: String = cleaned.chars().take(200).collect();
        Error::Provider {
            provider: provider.provider_id().to_string(),
            message: format!("structured output parse failed: {e}; content: {preview}"),
        }
    })
}

/// Strip a leading/trailing markdown code fence, if present. Models in
/// JSON mode occasionally wrap the payload anyway.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}
