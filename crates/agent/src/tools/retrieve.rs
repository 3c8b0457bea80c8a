//! Chunk retrieval tool backed by hybrid search.

use std::sync::Arc;

use serde_json::Value;

use quill_search::{SearchMode, SearchService};

use super::{Tool, ToolInvocation, ToolResult, RETRIEVE_CHUNKS};

const MAX_TOP_K: usize = 50;

pub struct RetrieveChunksTool {
    search: Arc<SearchService>,
    default_top_k: usize,
    user_id: String,
}

impl RetrieveChunksTool {
    pub fn new(search: Arc<SearchService>, default_top_k: usize, user_id: &str) -> Self {
        Self {
            search,
            default_top_k,
            user_id: user_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for RetrieveChunksTool {
    fn name(&self) -> &'static str {
        RETRIEVE_CHUNKS
    }

    fn description(&self) -> &'static str {
        "Search the arXiv research paper database for relevant document chunks. \
         Use this when you need information from ingested academic papers on any \
         scientific or technical topic."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query for finding relevant research paper chunks"
                },
                "top_k": {
                    "type": "integer",
                    "description": format!("Number of chunks to retrieve (1-{MAX_TOP_K})"),
                    "default": self.default_top_k
                }
            },
            "required": ["query"]
        })
    }

    fn extends_chunks(&self) -> bool {
        true
    }

    fn required_dependencies(&self) -> &'static [&'static str] {
        &["search_service"]
    }

    async fn execute(&self, args: Value, _inv: &ToolInvocation<'_>) -> ToolResult {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        if query.trim().is_empty() {
            return ToolResult::fail(RETRIEVE_CHUNKS, "Query cannot be empty");
        }

        let top_k = args
            .get("top_k")
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .unwrap_or(self.default_top_k)
            .clamp(1, MAX_TOP_K);

        tracing::debug!(query = %query, top_k, "retrieve_chunks executing");

        match self
            .search
            .hybrid_search(query, top_k, SearchMode::Hybrid, None, &self.user_id)
            .await
        {
            Ok(chunks) => {
                tracing::debug!(chunks_found = chunks.len(), "retrieve_chunks completed");
                ToolResult::ok_chunks(RETRIEVE_CHUNKS, chunks)
            }
            Err(e) => {
                tracing::error!(error = %e, "retrieve_chunks failed");
                ToolResult::fail(RETRIEVE_CHUNKS, e.to_string())
            }
        }
    }
}
