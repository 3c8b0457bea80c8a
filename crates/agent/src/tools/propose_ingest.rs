//! HITL proposal tool: a successful call pauses the graph until the
//! user confirms or declines the ingestion.

use serde_json::Value;

use quill_domain::stream::ProposalPaper;
use quill_store::PaperStore;

use super::{Tool, ToolInvocation, ToolResult, ARXIV_SEARCH, PROPOSE_INGEST};

const MAX_PROPOSAL: usize = 5;

fn format_proposal_summary(papers: &[ProposalPaper]) -> String {
    let mut lines = vec![format!(
        "Proposed {} papers for user confirmation:",
        papers.len()
    )];
    for (i, p) in papers.iter().enumerate() {
        lines.push(format!("{}. \"{}\" [{}]", i + 1, p.title, p.arxiv_id));
    }
    lines.join("\n")
}

pub struct ProposeIngestTool {
    papers: PaperStore,
    user_id: String,
}

impl ProposeIngestTool {
    pub fn new(papers: PaperStore, user_id: &str) -> Self {
        Self {
            papers,
            user_id: user_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ProposeIngestTool {
    fn name(&self) -> &'static str {
        PROPOSE_INGEST
    }

    fn description(&self) -> &'static str {
        "Propose papers for ingestion into the knowledge base. \
         Use ONLY AFTER arxiv_search AND only when the user explicitly asked to \
         find, add, import, or ingest new papers. \
         Never propose ingestion on your own initiative. \
         Provide the arXiv IDs from a previous arxiv_search result. \
         Limited to 5 papers per proposal."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "arxiv_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "arXiv IDs to propose for ingestion (from arxiv_search results)"
                }
            },
            "required": ["arxiv_ids"]
        })
    }

    fn sets_pause(&self) -> bool {
        true
    }

    fn required_dependencies(&self) -> &'static [&'static str] {
        &["paper_store"]
    }

    async fn execute(&self, args: Value, inv: &ToolInvocation<'_>) -> ToolResult {
        let arxiv_ids: Vec<String> = args
            .get("arxiv_ids")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        if arxiv_ids.is_empty() {
            return ToolResult::fail(
                PROPOSE_INGEST,
                "Must provide arxiv_ids to propose for ingestion",
            );
        }

        // A proposal must chain off a search made this turn; metadata
        // for the proposal dialog comes from that search result.
        let Some(prior_search) = inv
            .tool_outputs
            .iter()
            .find(|out| out.tool_name == ARXIV_SEARCH)
        else {
            return ToolResult::fail(
                PROPOSE_INGEST,
                "propose_ingest requires a prior arxiv_search in the same turn. \
                 Run arxiv_search first to find papers, then propose them.",
            );
        };

        let arxiv_ids: Vec<String> = arxiv_ids.into_iter().take(MAX_PROPOSAL).collect();

        let existing = match self
            .papers
            .existing_arxiv_ids(&arxiv_ids, &self.user_id)
            .await
        {
            Ok(set) => set,
            Err(e) => return ToolResult::fail(PROPOSE_INGEST, e.to_string()),
        };
        let remaining: Vec<String> = arxiv_ids
            .iter()
            .filter(|id| !existing.contains(*id))
            .cloned()
            .collect();

        if remaining.is_empty() {
            return ToolResult::ok_value(
                PROPOSE_INGEST,
                serde_json::json!({ "papers": [], "proposed_ids": [] }),
                Some("All proposed papers are already in the knowledge base.".into()),
            );
        }

        let search_papers = prior_search
            .data
            .get("papers")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let papers: Vec<ProposalPaper> = remaining
            .iter()
            .map(|id| {
                let meta = search_papers
                    .iter()
                    .find(|p| p.get("arxiv_id").and_then(|v| v.as_str()) == Some(id));
                let get_str = |key: &str| {
                    meta.and_then(|m| m.get(key))
                        .and_then(|v| v.as_str())
                        .map(String::from)
                };
                ProposalPaper {
                    arxiv_id: id.clone(),
                    title: get_str("title").unwrap_or_else(|| "Unknown".into()),
                    authors: meta
                        .and_then(|m| m.get("authors"))
                        .and_then(|v| v.as_array())
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|v| v.as_str().map(String::from))
                                .collect()
                        })
                        .unwrap_or_default(),
                    abstract_text: get_str("abstract").unwrap_or_default(),
                    published_date: get_str("published_date"),
                    pdf_url: get_str("pdf_url")
                        .unwrap_or_else(|| format!("https://arxiv.org/pdf/{id}.pdf")),
                }
            })
            .collect();

        tracing::info!(
            proposed = papers.len(),
            filtered = arxiv_ids.len() - remaining.len(),
            "propose_ingest"
        );

        let prompt_text = format_proposal_summary(&papers);
        let data = serde_json::json!({
            "papers": papers,
            "proposed_ids": remaining,
        });
        ToolResult::ok_value(PROPOSE_INGEST, data, Some(prompt_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ToolOutput;
    use quill_store::Db;

    const USER: &str = "11111111-1111-1111-1111-111111111111";

    fn tool() -> ProposeIngestTool {
        ProposeIngestTool::new(PaperStore::new(Db::in_memory().unwrap()), USER)
    }

    fn search_output() -> ToolOutput {
        ToolOutput {
            tool_name: ARXIV_SEARCH.into(),
            data: serde_json::json!({
                "count": 2,
                "papers": [
                    {"arxiv_id": "2401.00001", "title": "First", "authors": ["A"],
                     "abstract": "a", "pdf_url": "https://arxiv.org/pdf/2401.00001.pdf"},
                    {"arxiv_id": "2401.00002", "title": "Second", "authors": ["B"],
                     "abstract": "b", "pdf_url": "https://arxiv.org/pdf/2401.00002.pdf"},
                ]
            }),
            prompt_text: None,
        }
    }

    #[tokio::test]
    async fn requires_prior_search() {
        let inv = ToolInvocation { tool_outputs: &[] };
        let result = tool()
            .execute(serde_json::json!({"arxiv_ids": ["2401.00001"]}), &inv)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("prior arxiv_search"));
    }

    #[tokio::test]
    async fn requires_ids() {
        let outputs = [search_output()];
        let inv = ToolInvocation {
            tool_outputs: &outputs,
        };
        let result = tool().execute(serde_json::json!({}), &inv).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn proposes_with_search_metadata() {
        let outputs = [search_output()];
        let inv = ToolInvocation {
            tool_outputs: &outputs,
        };
        let result = tool()
            .execute(
                serde_json::json!({"arxiv_ids": ["2401.00001", "2401.00002"]}),
                &inv,
            )
            .await;
        assert!(result.success);
        let data = match result.data.unwrap() {
            super::super::ToolData::Value(v) => v,
            _ => panic!("expected value data"),
        };
        assert_eq!(data["proposed_ids"].as_array().unwrap().len(), 2);
        assert_eq!(data["papers"][0]["title"], "First");
        assert!(result.prompt_text.unwrap().contains("Proposed 2 papers"));
    }

    #[tokio::test]
    async fn caps_at_five_proposals() {
        let outputs = [search_output()];
        let inv = ToolInvocation {
            tool_outputs: &outputs,
        };
        let ids: Vec<String> = (0..8).map(|i| format!("2401.0000{i}")).collect();
        let result = tool()
            .execute(serde_json::json!({"arxiv_ids": ids}), &inv)
            .await;
        assert!(result.success);
        let data = match result.data.unwrap() {
            super::super::ToolData::Value(v) => v,
            _ => panic!("expected value data"),
        };
        assert!(data["proposed_ids"].as_array().unwrap().len() <= 5);
    }
}
