//! The orchestrator: a tagged-node state machine with pure transition
//! functions and a single loop owning the mutable [`AgentState`].
//!
//! ```text
//! START -> classify_and_route
//! classify_and_route -> out_of_scope | executor | evaluate | generate
//! executor           -> HITL pause | evaluate | classify_and_route
//! evaluate           -> generate | classify_and_route
//! generate           -> END        out_of_scope -> END
//! ```
//!
//! Termination is doubly bounded: the classifier's iteration guard
//! forces `direct` past `max_iterations`, and stagnation detection in
//! evaluation breaks the rewrite loop.

use std::sync::Arc;

use tokio::sync::mpsc;

use quill_domain::error::Result;

use crate::cancel::CancelToken;
use crate::checkpoint::CheckpointStore;
use crate::context::AgentContext;
use crate::events::{AgentEvent, NodeSummary, NodeTag};
use crate::nodes;
use crate::state::{
    AgentState, AgentStatus, Intent, ResumeDecision, ToolExecution, ToolOutput,
};
use crate::tools::RETRIEVE_CHUNKS;

/// Channel depth for graph events; generation tokens are the dominant
/// traffic.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Synthetic tool name recorded when a HITL confirmation resolves.
pub const INGEST_CONFIRMATION: &str = "ingest_confirmation";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition functions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn route_after_classify(state: &AgentState) -> NodeTag {
    let Some(result) = &state.classification_result else {
        return NodeTag::OutOfScope;
    };

    if result.intent == Intent::OutOfScope
        || result.scope_score < state.meta.guardrail_threshold
    {
        return NodeTag::OutOfScope;
    }

    if result.intent == Intent::Execute && !result.tool_calls.is_empty() {
        return NodeTag::Executor;
    }

    // Direct intent with ungraded retrieved chunks: evaluate first
    // rather than skipping straight to generation.
    if !state.retrieved_chunks.is_empty() && state.relevant_chunks.is_empty() {
        return NodeTag::Evaluate;
    }

    NodeTag::Generate
}

/// Where the executor hands off: the HITL pause, evaluation when a
/// retrieval succeeded in this batch, or back to the classifier.
pub(crate) enum AfterExecutor {
    Pause,
    Node(NodeTag),
}

pub(crate) fn route_after_executor(state: &AgentState) -> AfterExecutor {
    if state.pause_reason.is_some() {
        return AfterExecutor::Pause;
    }

    if state.last_executed_tools.is_empty() {
        return AfterExecutor::Node(NodeTag::ClassifyAndRoute);
    }

    if state
        .last_executed_tools
        .iter()
        .any(|name| name == RETRIEVE_CHUNKS)
    {
        for exec in state.tool_history.iter().rev() {
            if exec.tool_name == RETRIEVE_CHUNKS {
                return AfterExecutor::Node(if exec.success {
                    NodeTag::Evaluate
                } else {
                    NodeTag::ClassifyAndRoute
                });
            }
        }
    }

    AfterExecutor::Node(NodeTag::ClassifyAndRoute)
}

pub(crate) fn route_after_eval(state: &AgentState) -> NodeTag {
    let Some(evaluation) = &state.evaluation_result else {
        return NodeTag::Generate;
    };

    if evaluation.sufficient || state.iteration >= state.max_iterations {
        return NodeTag::Generate;
    }

    NodeTag::ClassifyAndRoute
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Graph {
    ctx: Arc<AgentContext>,
    checkpoints: Arc<CheckpointStore>,
}

impl Graph {
    pub fn new(ctx: Arc<AgentContext>, checkpoints: Arc<CheckpointStore>) -> Self {
        Self { ctx, checkpoints }
    }

    /// Drive a fresh invocation on a background task; events arrive on
    /// the returned channel, ending with exactly one terminal event.
    pub fn spawn(&self, state: AgentState, cancel: CancelToken) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let ctx = self.ctx.clone();
        let checkpoints = self.checkpoints.clone();
        tokio::spawn(async move {
            if let Err(e) = run_loop(&ctx, &checkpoints, state, &tx, &cancel).await {
                tracing::error!(error = %e, "agent run failed");
                let _ = tx
                    .send(AgentEvent::Failed {
                        error: e.to_string(),
                        code: e.code(),
                    })
                    .await;
            }
        });
        rx
    }

    /// Rehydrate a paused run and fold the user's decision into its
    /// state. The caller spawns the returned state to continue.
    pub fn prepare_resume(
        &self,
        thread_id: &str,
        decision: &ResumeDecision,
    ) -> Result<AgentState> {
        let mut state = self.checkpoints.take(thread_id)?;

        state.status = AgentStatus::Running;
        state.pause_reason = None;

        let (summary, data) = if decision.approved {
            let summary = format!(
                "User approved ingestion of {} papers: [{}]",
                decision.selected_ids.len(),
                decision.selected_ids.join(", ")
            );
            let data = serde_json::json!({
                "approved": true,
                "selected_ids": decision.selected_ids,
                "report": decision.ingest_summary,
            });
            (summary, data)
        } else {
            (
                "User declined the proposed ingestion.".to_string(),
                serde_json::json!({ "approved": false, "selected_ids": [] }),
            )
        };

        state.tool_history.push(ToolExecution {
            tool_name: INGEST_CONFIRMATION.into(),
            tool_args: serde_json::json!({}),
            success: true,
            result_summary: summary.clone(),
            error: None,
        });
        state.tool_outputs.push(ToolOutput {
            tool_name: INGEST_CONFIRMATION.into(),
            data,
            prompt_text: Some(summary.clone()),
        });
        state.push_reasoning(summary);

        Ok(state)
    }
}

async fn run_loop(
    ctx: &AgentContext,
    checkpoints: &CheckpointStore,
    mut state: AgentState,
    tx: &mpsc::Sender<AgentEvent>,
    cancel: &CancelToken,
) -> Result<()> {
    let mut node = NodeTag::ClassifyAndRoute;

    loop {
        // Between nodes, a cancelled run finishes immediately with
        // whatever state it has; the caller persists the partial turn.
        if cancel.is_cancelled() {
            tracing::info!(session_id = %state.session_id, "agent run cancelled");
            state.status = AgentStatus::Completed;
            let _ = tx
                .send(AgentEvent::Finished {
                    state: Box::new(state),
                })
                .await;
            return Ok(());
        }

        match node {
            NodeTag::ClassifyAndRoute => {
                let _ = tx.send(AgentEvent::NodeStart { node }).await;
                nodes::classify::classify_and_route(&mut state, ctx).await?;

                if let Some(result) = state.classification_result.clone() {
                    let _ = tx
                        .send(AgentEvent::NodeEnd {
                            node,
                            summary: NodeSummary::Classified {
                                intent: format!("{:?}", result.intent).to_lowercase(),
                                scope_score: result.scope_score,
                                tools: result
                                    .tool_calls
                                    .iter()
                                    .map(|tc| tc.tool_name.clone())
                                    .collect(),
                                iteration: state.iteration,
                                reasoning: result.reasoning.clone(),
                            },
                        })
                        .await;
                }

                node = route_after_classify(&state);
            }

            NodeTag::Executor => {
                // Tool start/end events tell this node's story; no
                // node-level status events.
                nodes::executor::run_tools(&mut state, ctx, tx).await?;

                match route_after_executor(&state) {
                    AfterExecutor::Pause => {
                        let reason = state.pause_reason.clone().unwrap_or_default();
                        state.status = AgentStatus::Paused;
                        checkpoints.put(&state)?;
                        tracing::info!(
                            thread_id = %state.thread_id,
                            proposed = reason.proposed_ids.len(),
                            "agent paused for ingest confirmation"
                        );
                        let _ = tx
                            .send(AgentEvent::Interrupted {
                                papers: reason.papers,
                                proposed_ids: reason.proposed_ids,
                                state: Box::new(state),
                            })
                            .await;
                        return Ok(());
                    }
                    AfterExecutor::Node(next) => node = next,
                }
            }

            NodeTag::Evaluate => {
                let _ = tx.send(AgentEvent::NodeStart { node }).await;
                nodes::evaluate::evaluate_batch(&mut state, ctx).await?;

                let sufficient = state
                    .evaluation_result
                    .as_ref()
                    .is_some_and(|e| e.sufficient);
                let _ = tx
                    .send(AgentEvent::NodeEnd {
                        node,
                        summary: NodeSummary::Evaluated {
                            relevant: state.relevant_chunks.clone(),
                            total: state.retrieved_chunks.len(),
                            sufficient,
                        },
                    })
                    .await;

                node = route_after_eval(&state);
            }

            NodeTag::Generate => {
                let _ = tx.send(AgentEvent::NodeStart { node }).await;
                nodes::generate::generate_answer(&mut state, ctx, tx, cancel).await?;
                // A cancelled stream must end promptly: no trailing
                // status event, just the terminal one.
                if !cancel.is_cancelled() {
                    let _ = tx
                        .send(AgentEvent::NodeEnd {
                            node,
                            summary: NodeSummary::Generated,
                        })
                        .await;
                }

                state.status = AgentStatus::Completed;
                let _ = tx
                    .send(AgentEvent::Finished {
                        state: Box::new(state),
                    })
                    .await;
                return Ok(());
            }

            NodeTag::OutOfScope => {
                let _ = tx.send(AgentEvent::NodeStart { node }).await;
                nodes::out_of_scope::out_of_scope(&mut state, ctx, tx, cancel).await?;
                if !cancel.is_cancelled() {
                    let _ = tx
                        .send(AgentEvent::NodeEnd {
                            node,
                            summary: NodeSummary::OutOfScope,
                        })
                        .await;
                }

                state.status = AgentStatus::Completed;
                let _ = tx
                    .send(AgentEvent::Finished {
                        state: Box::new(state),
                    })
                    .await;
                return Ok(());
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BatchEvaluation, ClassificationResult, PauseReason, ToolCallRequest};
    use quill_domain::paper::Chunk;

    fn state() -> AgentState {
        AgentState::new("q", "s", "t", Vec::new(), None, 75, 3, 5)
    }

    fn chunk() -> Chunk {
        Chunk {
            chunk_id: "c".into(),
            arxiv_id: "a".into(),
            title: "T".into(),
            authors: vec![],
            chunk_text: "x".into(),
            section_name: None,
            page_number: None,
            score: 0.0,
            pdf_url: "u".into(),
            published_date: None,
        }
    }

    fn execution(name: &str, success: bool) -> ToolExecution {
        ToolExecution {
            tool_name: name.into(),
            tool_args: serde_json::json!({}),
            success,
            result_summary: String::new(),
            error: None,
        }
    }

    #[test]
    fn classify_missing_result_is_out_of_scope() {
        assert_eq!(route_after_classify(&state()), NodeTag::OutOfScope);
    }

    #[test]
    fn classify_low_score_is_out_of_scope() {
        let mut s = state();
        s.classification_result = Some(ClassificationResult::direct(40, "cake recipe"));
        assert_eq!(route_after_classify(&s), NodeTag::OutOfScope);
    }

    #[test]
    fn classify_execute_routes_to_executor() {
        let mut s = state();
        s.classification_result = Some(ClassificationResult {
            intent: Intent::Execute,
            tool_calls: vec![ToolCallRequest {
                tool_name: "retrieve_chunks".into(),
                tool_args_json: "{}".into(),
            }],
            scope_score: 95,
            reasoning: String::new(),
        });
        assert_eq!(route_after_classify(&s), NodeTag::Executor);
    }

    #[test]
    fn classify_direct_with_ungraded_chunks_evaluates() {
        let mut s = state();
        s.classification_result = Some(ClassificationResult::direct(95, "enough context"));
        s.retrieved_chunks = vec![chunk()];
        assert_eq!(route_after_classify(&s), NodeTag::Evaluate);
    }

    #[test]
    fn classify_direct_without_chunks_generates() {
        let mut s = state();
        s.classification_result = Some(ClassificationResult::direct(95, "enough context"));
        assert_eq!(route_after_classify(&s), NodeTag::Generate);
    }

    #[test]
    fn executor_pause_reason_interrupts() {
        let mut s = state();
        s.pause_reason = Some(PauseReason {
            papers: vec![],
            proposed_ids: vec!["a".into()],
        });
        assert!(matches!(route_after_executor(&s), AfterExecutor::Pause));
    }

    #[test]
    fn executor_successful_retrieve_evaluates() {
        let mut s = state();
        s.last_executed_tools = vec![RETRIEVE_CHUNKS.into()];
        s.tool_history.push(execution(RETRIEVE_CHUNKS, true));
        assert!(matches!(
            route_after_executor(&s),
            AfterExecutor::Node(NodeTag::Evaluate)
        ));
    }

    #[test]
    fn executor_failed_retrieve_reclassifies() {
        let mut s = state();
        s.last_executed_tools = vec![RETRIEVE_CHUNKS.into()];
        s.tool_history.push(execution(RETRIEVE_CHUNKS, false));
        assert!(matches!(
            route_after_executor(&s),
            AfterExecutor::Node(NodeTag::ClassifyAndRoute)
        ));
    }

    #[test]
    fn executor_non_retrieve_tools_reclassify() {
        let mut s = state();
        s.last_executed_tools = vec!["arxiv_search".into()];
        s.tool_history.push(execution("arxiv_search", true));
        assert!(matches!(
            route_after_executor(&s),
            AfterExecutor::Node(NodeTag::ClassifyAndRoute)
        ));
    }

    #[test]
    fn eval_sufficient_generates() {
        let mut s = state();
        s.evaluation_result = Some(BatchEvaluation {
            sufficient: true,
            reasoning: String::new(),
            suggested_rewrite: None,
        });
        assert_eq!(route_after_eval(&s), NodeTag::Generate);
    }

    #[test]
    fn eval_insufficient_with_iterations_left_reclassifies() {
        let mut s = state();
        s.iteration = 1;
        s.evaluation_result = Some(BatchEvaluation {
            sufficient: false,
            reasoning: String::new(),
            suggested_rewrite: Some("better query".into()),
        });
        assert_eq!(route_after_eval(&s), NodeTag::ClassifyAndRoute);
    }

    #[test]
    fn eval_insufficient_at_max_iterations_generates() {
        let mut s = state();
        s.iteration = 5;
        s.evaluation_result = Some(BatchEvaluation {
            sufficient: false,
            reasoning: String::new(),
            suggested_rewrite: None,
        });
        assert_eq!(route_after_eval(&s), NodeTag::Generate);
    }
}
