//! Executor: runs the router's tool calls in parallel.
//!
//! Errors are isolated per call and never escape; `tool_history`
//! records results in request order regardless of completion order.

use serde_json::Value;
use tokio::sync::mpsc;

use quill_domain::error::{Error, Result};

use crate::context::AgentContext;
use crate::events::AgentEvent;
use crate::state::{AgentState, PauseReason, ToolExecution, ToolOutput};
use crate::tools::{ToolData, ToolInvocation, ToolResult};

const PAPER_SUMMARY_VERBS: [(&str, &str); 2] =
    [("arxiv_search", "Found"), ("ingest_papers", "Ingested")];

pub async fn run_tools(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &mpsc::Sender<AgentEvent>,
) -> Result<()> {
    let Some(decision) = state.router_decision.clone() else {
        tracing::warn!("executor called without valid tool decision");
        return Ok(());
    };
    if decision.tool_calls.is_empty() {
        tracing::warn!("executor called with empty tool calls");
        return Ok(());
    }

    // Snapshot of the outputs accumulated before this batch; chained
    // tools (propose after search) validate against it.
    let prior_outputs = state.tool_outputs.clone();

    let futures = decision.tool_calls.iter().map(|tc| {
        let prior = &prior_outputs;
        let events = events.clone();
        async move {
            let args: Value = if tc.tool_args_json.trim().is_empty() {
                serde_json::json!({})
            } else {
                match serde_json::from_str(&tc.tool_args_json) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            raw = %head(&tc.tool_args_json, 100),
                            "failed to parse tool_args_json"
                        );
                        return (
                            tc.tool_name.clone(),
                            serde_json::json!({}),
                            ToolResult::fail(
                                &tc.tool_name,
                                format!("Invalid tool arguments: {e}"),
                            ),
                        );
                    }
                }
            };

            tracing::info!(
                tool_name = %tc.tool_name,
                args = %head(&args.to_string(), 200),
                "executor running tool"
            );
            let _ = events
                .send(AgentEvent::ToolStart {
                    tool_name: tc.tool_name.clone(),
                    args: args.clone(),
                })
                .await;

            let inv = ToolInvocation {
                tool_outputs: prior,
            };
            let result = match ctx.tools.execute(&tc.tool_name, args.clone(), &inv).await {
                Ok(result) => result,
                // Unknown tool names and other dispatch errors become
                // failed executions, never panics or stream failures.
                Err(e) => ToolResult::fail(&tc.tool_name, e.to_string()),
            };

            tracing::info!(
                tool_name = %tc.tool_name,
                success = result.success,
                error = result.error.as_deref().unwrap_or(""),
                "executor tool completed"
            );
            let _ = events
                .send(AgentEvent::ToolEnd {
                    tool_name: tc.tool_name.clone(),
                    success: result.success,
                })
                .await;

            (tc.tool_name.clone(), args, result)
        }
    });

    // All calls race in parallel; join_all preserves request order.
    let results = futures_util::future::join_all(futures).await;

    let mut last_executed = Vec::new();
    let mut batch_chunks = Vec::new();

    for (tool_name, tool_args, result) in results {
        last_executed.push(tool_name.clone());

        state.tool_history.push(ToolExecution {
            tool_name: tool_name.clone(),
            tool_args,
            success: result.success,
            result_summary: summarize_result(&tool_name, &result),
            error: result.error.clone(),
        });

        if result.success {
            let sets_pause = ctx
                .tools
                .get(&tool_name)
                .is_some_and(|t| t.sets_pause());
            let extends_chunks = ctx
                .tools
                .get(&tool_name)
                .is_some_and(|t| t.extends_chunks());

            match result.data {
                Some(ToolData::Chunks(chunks)) if extends_chunks => {
                    batch_chunks.extend(chunks);
                }
                Some(ToolData::Value(_)) if extends_chunks => {
                    // A chunk-producing tool returning non-list data is
                    // a misconfiguration; fail loudly.
                    return Err(Error::Tool {
                        tool: tool_name,
                        message: "tool declares extends_chunks but returned non-list data"
                            .into(),
                    });
                }
                Some(ToolData::Value(data)) => {
                    if sets_pause {
                        match serde_json::from_value::<PauseReason>(data.clone()) {
                            Ok(reason) if !reason.proposed_ids.is_empty() => {
                                state.pause_reason = Some(reason);
                            }
                            Ok(_) => {} // nothing left to propose
                            Err(e) => {
                                tracing::error!(
                                    tool_name = %tool_name,
                                    error = %e,
                                    "pause tool returned malformed pause payload"
                                );
                            }
                        }
                    }
                    state.tool_outputs.push(ToolOutput {
                        tool_name: tool_name.clone(),
                        data,
                        prompt_text: result.prompt_text.clone(),
                    });
                }
                Some(ToolData::Chunks(chunks)) => {
                    // Non-retrieval tool handing back chunks: keep them
                    // for the generator as serialized data.
                    state.tool_outputs.push(ToolOutput {
                        tool_name: tool_name.clone(),
                        data: serde_json::to_value(chunks).unwrap_or(Value::Null),
                        prompt_text: result.prompt_text.clone(),
                    });
                }
                None => {} // success with nothing to capture
            }
        } else {
            state.tool_outputs.push(ToolOutput {
                tool_name: tool_name.clone(),
                data: serde_json::json!({
                    "error": result.error.clone().unwrap_or_default()
                }),
                prompt_text: None,
            });
        }
    }

    state.last_executed_tools = last_executed;
    if !batch_chunks.is_empty() {
        // Each retrieval batch replaces the working set: stagnation
        // detection compares batch-to-batch fingerprints.
        state.retrieved_chunks = batch_chunks;
        state.retrieval_attempts += 1;
    }

    Ok(())
}

/// Brief summary of a tool result with actionable detail for the
/// router's next decision.
fn summarize_result(tool_name: &str, result: &ToolResult) -> String {
    if result.success {
        match &result.data {
            Some(ToolData::Chunks(chunks)) => format!("Retrieved {} items", chunks.len()),
            Some(ToolData::Value(data)) => {
                if let Some(verb) = PAPER_SUMMARY_VERBS
                    .iter()
                    .find(|(name, _)| *name == tool_name)
                    .map(|(_, verb)| *verb)
                {
                    if let Some(papers) = data.get("papers").and_then(|p| p.as_array()) {
                        if !papers.is_empty() {
                            let ids: Vec<&str> = papers
                                .iter()
                                .filter_map(|p| p.get("arxiv_id").and_then(|v| v.as_str()))
                                .take(10)
                                .collect();
                            let count = data
                                .get("count")
                                .or_else(|| data.get("papers_processed"))
                                .and_then(|v| v.as_u64())
                                .unwrap_or(ids.len() as u64);
                            return format!("{verb} {count} papers: [{}]", ids.join(", "));
                        }
                    }
                }
                if let Some(total) = data.get("total_count").and_then(|v| v.as_u64()) {
                    return format!("Found {total} items");
                }
                head(&data.to_string(), 200)
            }
            None => String::new(),
        }
    } else if let Some(error) = &result.error {
        format!("Error: {error}")
    } else {
        String::new()
    }
}

fn head(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_domain::paper::Chunk;

    fn chunk() -> Chunk {
        Chunk {
            chunk_id: "c".into(),
            arxiv_id: "2401.00001".into(),
            title: "T".into(),
            authors: vec![],
            chunk_text: "text".into(),
            section_name: None,
            page_number: None,
            score: 0.5,
            pdf_url: "u".into(),
            published_date: None,
        }
    }

    #[test]
    fn summarize_chunk_results() {
        let result = ToolResult::ok_chunks("retrieve_chunks", vec![chunk(), chunk()]);
        assert_eq!(summarize_result("retrieve_chunks", &result), "Retrieved 2 items");
    }

    #[test]
    fn summarize_paper_results_lists_ids() {
        let result = ToolResult::ok_value(
            "arxiv_search",
            serde_json::json!({
                "count": 2,
                "papers": [{"arxiv_id": "a1"}, {"arxiv_id": "a2"}],
            }),
            None,
        );
        assert_eq!(
            summarize_result("arxiv_search", &result),
            "Found 2 papers: [a1, a2]"
        );
    }

    #[test]
    fn summarize_total_count() {
        let result = ToolResult::ok_value(
            "list_papers",
            serde_json::json!({"total_count": 7, "papers": []}),
            None,
        );
        assert_eq!(summarize_result("list_papers", &result), "Found 7 items");
    }

    #[test]
    fn summarize_failure_surfaces_error() {
        let result = ToolResult::fail("arxiv_search", "registry HTTP 503");
        assert_eq!(
            summarize_result("arxiv_search", &result),
            "Error: registry HTTP 503"
        );
    }
}
