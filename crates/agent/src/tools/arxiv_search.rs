//! Registry search tool: metadata only, nothing is ingested.

use std::sync::Arc;

use serde_json::Value;

use quill_papers::{RegistryClient, SearchParams};

use super::util::{format_paper_for_prompt, parse_date};
use super::{Tool, ToolInvocation, ToolResult, ARXIV_SEARCH};

const MAX_RESULTS: usize = 10;

fn format_search_results(data: &Value) -> String {
    let papers = data
        .get("papers")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();
    if papers.is_empty() {
        return data
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("No papers found.")
            .to_string();
    }
    let mut lines = vec![format!("Found {} papers:", papers.len())];
    for (i, p) in papers.iter().enumerate() {
        lines.push(format_paper_for_prompt(p, i + 1));
    }
    lines.join("\n")
}

pub struct ArxivSearchTool {
    registry: Arc<RegistryClient>,
}

impl ArxivSearchTool {
    pub fn new(registry: Arc<RegistryClient>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl Tool for ArxivSearchTool {
    fn name(&self) -> &'static str {
        ARXIV_SEARCH
    }

    fn description(&self) -> &'static str {
        "Search arXiv for papers matching a query. Returns metadata only without \
         downloading or processing. Use when user wants to find papers on arXiv \
         or explore what's available before deciding to ingest."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query (e.g. 'transformer attention mechanism'). \
                        Use plain keywords -- no raw date syntax; use start_date/end_date for dates."
                },
                "max_results": {
                    "type": "integer",
                    "description": format!("Maximum papers to return (1-{MAX_RESULTS}, default 5)"),
                    "default": 5
                },
                "categories": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Filter by arXiv categories (e.g. ['cs.LG', 'cs.AI'])"
                },
                "start_date": {
                    "type": "string",
                    "description": "Papers published after (YYYY-MM-DD)"
                },
                "end_date": {
                    "type": "string",
                    "description": "Papers published before (YYYY-MM-DD)"
                }
            },
            "required": ["query"]
        })
    }

    fn required_dependencies(&self) -> &'static [&'static str] {
        &["registry_client"]
    }

    async fn execute(&self, args: Value, _inv: &ToolInvocation<'_>) -> ToolResult {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        if query.trim().is_empty() {
            return ToolResult::fail(
                ARXIV_SEARCH,
                "Query is required. Provide keywords (e.g. 'machine learning'). \
                 Use start_date/end_date parameters for date filtering.",
            );
        }

        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(5)
            .clamp(1, MAX_RESULTS);

        let categories: Vec<String> = args
            .get("categories")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let start_raw = args.get("start_date").and_then(|v| v.as_str());
        let end_raw = args.get("end_date").and_then(|v| v.as_str());
        let (start_date, end_date) = match (
            parse_date(start_raw, "start_date"),
            parse_date(end_raw, "end_date"),
        ) {
            (Ok(s), Ok(e)) => (s, e),
            (Err(e), _) | (_, Err(e)) => return ToolResult::fail(ARXIV_SEARCH, e),
        };

        tracing::debug!(query = %query, max_results, "arxiv_search executing");

        let params = SearchParams {
            query: query.to_string(),
            max_results,
            categories,
            start_date: start_date.map(|d| d.to_string()),
            end_date: end_date.map(|d| d.to_string()),
        };

        match self.registry.search_papers(&params).await {
            Ok(papers) => {
                let results: Vec<Value> = papers
                    .iter()
                    .map(|p| {
                        let abstract_capped: String =
                            p.abstract_text.chars().take(500).collect();
                        serde_json::json!({
                            "arxiv_id": p.arxiv_id,
                            "title": p.title,
                            "authors": p.authors,
                            "abstract": if p.abstract_text.chars().count() > 500 {
                                format!("{abstract_capped}...")
                            } else {
                                abstract_capped
                            },
                            "categories": p.categories,
                            "published_date": p.published_date,
                            "pdf_url": p.pdf_url,
                        })
                    })
                    .collect();

                tracing::debug!(count = results.len(), "arxiv_search completed");

                let mut data = serde_json::json!({
                    "count": results.len(),
                    "papers": results,
                });
                if results_empty(&data) && (start_raw.is_some() || end_raw.is_some()) {
                    data["message"] = Value::String(
                        "No papers matched the given date range. Try broadening the \
                         date window or adjusting your query."
                            .into(),
                    );
                }
                let prompt_text = format_search_results(&data);
                ToolResult::ok_value(ARXIV_SEARCH, data, Some(prompt_text))
            }
            Err(e) => {
                tracing::error!(error = %e, "arxiv_search failed");
                ToolResult::fail(ARXIV_SEARCH, e.to_string())
            }
        }
    }
}

fn results_empty(data: &Value) -> bool {
    data.get("count").and_then(|c| c.as_u64()) == Some(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_results_lists_papers() {
        let data = serde_json::json!({
            "count": 1,
            "papers": [{
                "arxiv_id": "2401.00001",
                "title": "Attention",
                "authors": ["A. Author"],
                "abstract": "About attention.",
            }]
        });
        let text = format_search_results(&data);
        assert!(text.starts_with("Found 1 papers:"));
        assert!(text.contains("\"Attention\" by A. Author"));
    }

    #[test]
    fn format_results_uses_message_when_empty() {
        let data = serde_json::json!({
            "count": 0,
            "papers": [],
            "message": "No papers matched the given date range."
        });
        assert!(format_search_results(&data).contains("date range"));
    }
}
