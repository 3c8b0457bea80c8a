//! Tool seam: the trait, the result type, and the name-keyed registry.
//!
//! A tool is a value with capability flags and one async `execute`;
//! there is no per-tool inheritance. Registration fails fast on name
//! collisions and on missing constructor-captured collaborators.

mod arxiv_search;
mod citations;
mod ingest;
mod list_papers;
mod propose_ingest;
mod retrieve;
pub mod util;

pub use arxiv_search::ArxivSearchTool;
pub use citations::ExploreCitationsTool;
pub use ingest::IngestPapersTool;
pub use list_papers::ListPapersTool;
pub use propose_ingest::ProposeIngestTool;
pub use retrieve::RetrieveChunksTool;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use quill_domain::error::{Error, Result};
use quill_domain::paper::Chunk;

use crate::state::ToolOutput;

// ── Tool name constants ─────────────────────────────────────────────

pub const RETRIEVE_CHUNKS: &str = "retrieve_chunks";
pub const ARXIV_SEARCH: &str = "arxiv_search";
pub const LIST_PAPERS: &str = "list_papers";
pub const EXPLORE_CITATIONS: &str = "explore_citations";
pub const PROPOSE_INGEST: &str = "propose_ingest";
pub const INGEST_PAPERS: &str = "ingest_papers";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool payload: chunk-producing tools return `Chunks`, everything
/// else returns a JSON value.
#[derive(Debug, Clone)]
pub enum ToolData {
    Chunks(Vec<Chunk>),
    Value(Value),
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub data: Option<ToolData>,
    /// Pre-formatted text for the generator prompt, when the raw data
    /// would read poorly.
    pub prompt_text: Option<String>,
    pub error: Option<String>,
    pub tool_name: String,
}

impl ToolResult {
    pub fn ok_chunks(tool_name: &str, chunks: Vec<Chunk>) -> Self {
        Self {
            success: true,
            data: Some(ToolData::Chunks(chunks)),
            prompt_text: None,
            error: None,
            tool_name: tool_name.to_string(),
        }
    }

    pub fn ok_value(tool_name: &str, data: Value, prompt_text: Option<String>) -> Self {
        Self {
            success: true,
            data: Some(ToolData::Value(data)),
            prompt_text,
            error: None,
            tool_name: tool_name.to_string(),
        }
    }

    pub fn fail(tool_name: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            prompt_text: None,
            error: Some(error.into()),
            tool_name: tool_name.to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turn-scoped context the executor passes to each call.
pub struct ToolInvocation<'a> {
    /// Non-chunk results accumulated earlier this turn; lets chained
    /// tools validate and reuse prior results.
    pub tool_outputs: &'a [ToolOutput],
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema for the tool's arguments, rendered into the router
    /// prompt.
    fn parameters_schema(&self) -> Value;

    /// Successful `data` is a chunk list appended to retrieval state.
    fn extends_chunks(&self) -> bool {
        false
    }
    /// A successful call pauses the graph for human confirmation.
    fn sets_pause(&self) -> bool {
        false
    }
    /// Names of collaborators this tool needs; checked at registration.
    fn required_dependencies(&self) -> &'static [&'static str] {
        &[]
    }
    /// Subset of `required_dependencies` the constructor did not get.
    fn missing_dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn execute(&self, args: Value, inv: &ToolInvocation<'_>) -> ToolResult;
}

/// Schema row used to build the router prompt.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered, name-keyed tool table.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails when its name collides with an existing
    /// entry or its declared dependencies are not satisfied.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name();
        if self.by_name.contains_key(name) {
            return Err(Error::Config(format!("duplicate tool name: {name}")));
        }
        let missing = tool.missing_dependencies();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "tool {name} is missing dependencies: {}",
                missing.join(", ")
            )));
        }
        self.by_name.insert(name.to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    /// Registration-ordered schema list for the router prompt.
    pub fn all_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Dispatch a call. Unknown names fail with `ToolNotFound`; tool
    /// failures are encoded in the returned result, never errors.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        inv: &ToolInvocation<'_>,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        Ok(tool.execute(args, inv).await)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
