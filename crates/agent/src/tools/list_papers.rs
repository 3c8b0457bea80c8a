//! Knowledge-base browsing tool.

use serde_json::Value;

use quill_store::PaperStore;

use super::util::format_paper_for_prompt;
use super::{Tool, ToolInvocation, ToolResult, LIST_PAPERS};

const MAX_LIMIT: usize = 50;

pub struct ListPapersTool {
    papers: PaperStore,
    user_id: String,
}

impl ListPapersTool {
    pub fn new(papers: PaperStore, user_id: &str) -> Self {
        Self {
            papers,
            user_id: user_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ListPapersTool {
    fn name(&self) -> &'static str {
        LIST_PAPERS
    }

    fn description(&self) -> &'static str {
        "List papers already ingested into the knowledge base, newest first. \
         Use to browse what is available before retrieving or to answer \
         'what papers do you have' questions."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "offset": {
                    "type": "integer",
                    "description": "Papers to skip (default 0)",
                    "default": 0
                },
                "limit": {
                    "type": "integer",
                    "description": format!("Maximum papers to return (1-{MAX_LIMIT}, default 10)"),
                    "default": 10
                }
            },
            "required": []
        })
    }

    fn required_dependencies(&self) -> &'static [&'static str] {
        &["paper_store"]
    }

    async fn execute(&self, args: Value, _inv: &ToolInvocation<'_>) -> ToolResult {
        let offset = args
            .get("offset")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(10)
            .clamp(1, MAX_LIMIT);

        match self.papers.list(offset, limit, &self.user_id).await {
            Ok((papers, total)) => {
                let rows: Vec<Value> = papers
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "arxiv_id": p.arxiv_id,
                            "title": p.title,
                            "authors": p.authors,
                            "categories": p.categories,
                            "published_date": p.published_date,
                            "abstract": p.abstract_text,
                        })
                    })
                    .collect();

                let prompt_text = if rows.is_empty() {
                    "The knowledge base is empty. No papers have been ingested yet.".to_string()
                } else {
                    let mut lines =
                        vec![format!("Knowledge base has {total} papers. Showing {}:", rows.len())];
                    for (i, p) in rows.iter().enumerate() {
                        lines.push(format_paper_for_prompt(p, offset + i + 1));
                    }
                    lines.join("\n")
                };

                let data = serde_json::json!({
                    "total_count": total,
                    "papers": rows,
                });
                ToolResult::ok_value(LIST_PAPERS, data, Some(prompt_text))
            }
            Err(e) => {
                tracing::error!(error = %e, "list_papers failed");
                ToolResult::fail(LIST_PAPERS, e.to_string())
            }
        }
    }
}
