//! Citation exploration over ingested papers.

use serde_json::Value;

use quill_store::PaperStore;

use super::{Tool, ToolInvocation, ToolResult, EXPLORE_CITATIONS};

pub struct ExploreCitationsTool {
    papers: PaperStore,
    user_id: String,
}

impl ExploreCitationsTool {
    pub fn new(papers: PaperStore, user_id: &str) -> Self {
        Self {
            papers,
            user_id: user_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ExploreCitationsTool {
    fn name(&self) -> &'static str {
        EXPLORE_CITATIONS
    }

    fn description(&self) -> &'static str {
        "Explore the reference list of a paper in the knowledge base to find \
         related work it cites. The paper must already be ingested."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "arxiv_id": {
                    "type": "string",
                    "description": "arXiv ID of the ingested paper to explore"
                }
            },
            "required": ["arxiv_id"]
        })
    }

    fn required_dependencies(&self) -> &'static [&'static str] {
        &["paper_store"]
    }

    async fn execute(&self, args: Value, _inv: &ToolInvocation<'_>) -> ToolResult {
        let arxiv_id = args.get("arxiv_id").and_then(|v| v.as_str()).unwrap_or("");
        if arxiv_id.trim().is_empty() {
            return ToolResult::fail(EXPLORE_CITATIONS, "Must provide an arxiv_id to explore");
        }

        match self.papers.get_by_arxiv_id(arxiv_id, &self.user_id).await {
            Ok(Some(paper)) => {
                let prompt_text = if paper.references.is_empty() {
                    format!(
                        "\"{}\" [{}] has no extracted references.",
                        paper.title, paper.arxiv_id
                    )
                } else {
                    let mut lines = vec![format!(
                        "\"{}\" [{}] cites {} works:",
                        paper.title,
                        paper.arxiv_id,
                        paper.references.len()
                    )];
                    for (i, r) in paper.references.iter().enumerate() {
                        lines.push(format!("{}. {r}", i + 1));
                    }
                    lines.join("\n")
                };

                let data = serde_json::json!({
                    "arxiv_id": paper.arxiv_id,
                    "title": paper.title,
                    "references": paper.references,
                });
                ToolResult::ok_value(EXPLORE_CITATIONS, data, Some(prompt_text))
            }
            Ok(None) => ToolResult::fail(
                EXPLORE_CITATIONS,
                format!("Paper {arxiv_id} is not in the knowledge base. Ingest it first."),
            ),
            Err(e) => {
                tracing::error!(error = %e, "explore_citations failed");
                ToolResult::fail(EXPLORE_CITATIONS, e.to_string())
            }
        }
    }
}
