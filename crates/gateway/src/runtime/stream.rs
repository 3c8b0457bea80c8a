//! The stream service: wraps the agent graph, translates its events
//! into the external SSE contract, and persists every turn atomically.
//!
//! Ordering contract per stream: node status precedes any content it
//! generates, `sources` follows evaluation, `metadata` follows all
//! content, and `done` is always the final event -- on success, error,
//! HITL interrupt, and cancellation alike.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use quill_agent::format::ConversationFormatter;
use quill_agent::state::ConversationMessage;
use quill_agent::tools::{
    ArxivSearchTool, ExploreCitationsTool, IngestPapersTool, ListPapersTool, ProposeIngestTool,
    RetrieveChunksTool, ToolRegistry, EXPLORE_CITATIONS,
};
use quill_agent::{
    AgentContext, AgentEvent, AgentState, CancelToken, CheckpointStore, Graph, NodeSummary,
    NodeTag, ResumeDecision,
};
use quill_domain::config::{AgentConfig, SearchConfig};
use quill_domain::error::Result;
use quill_domain::paper::SourceInfo;
use quill_domain::stream::{
    CitationsData, ConfirmIngestData, ContentData, IngestCompleteData, MetadataData, SourcesData,
    StreamEvent,
};
use quill_ingest::IngestService;
use quill_papers::RegistryClient;
use quill_providers::{Embedder, ProviderRegistry};
use quill_search::SearchService;
use quill_store::{ChunkStore, ConversationStore, PaperStore, PendingConfirmation, TurnData};

use super::tasks::TaskRegistry;

/// Default chunk count for the retrieval tool when the router omits
/// `top_k`; deliberately wider than the per-request `top_k` so the
/// evaluator sees more candidates than generation will use.
const RETRIEVE_DEFAULT_TOP_K: usize = 6;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-request options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validated ask-mode tunables (ranges enforced at the API boundary).
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub query: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub top_k: usize,
    pub guardrail_threshold: u8,
    pub max_retrieval_attempts: u32,
    pub max_iterations: u32,
    pub temperature: f32,
    pub timeout_seconds: Option<f64>,
    pub session_id: Option<String>,
    pub conversation_window: usize,
}

#[derive(Debug, Clone)]
pub struct ResumeOptions {
    pub session_id: String,
    pub thread_id: String,
    pub approved: bool,
    pub selected_ids: Vec<String>,
}

/// How a consumed run ended.
enum RunOutcome {
    Finished(Box<AgentState>),
    Interrupted {
        papers: Vec<quill_domain::stream::ProposalPaper>,
        proposed_ids: Vec<String>,
        state: Box<AgentState>,
    },
    Failed,
}

/// Translator state carried across one consume loop.
struct Translator {
    answer: String,
    content_tokens: usize,
    sources_emitted: bool,
    top_k: usize,
    threshold: u8,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StreamService {
    pub llm: Arc<ProviderRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub search_config: SearchConfig,
    pub chunks: ChunkStore,
    pub papers: PaperStore,
    pub conversations: ConversationStore,
    pub registry_client: Option<Arc<RegistryClient>>,
    pub ingest: Option<Arc<IngestService>>,
    pub checkpoints: Arc<CheckpointStore>,
    pub tasks: Arc<TaskRegistry>,
    pub defaults: AgentConfig,
    pub llm_timeout: Duration,
}

impl StreamService {
    /// Run an ask-mode stream. Events arrive on the returned channel;
    /// the last one is always `done`.
    pub fn ask_stream(
        self: &Arc<Self>,
        opts: StreamOptions,
        user_id: String,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(256);
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.run_ask(&opts, &user_id, &tx).await {
                tracing::error!(error = %e, "ask stream failed");
                let _ = tx
                    .send(StreamEvent::error(e.to_string(), Some(e.code())))
                    .await;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });
        rx
    }

    /// Run a HITL resume stream.
    pub fn resume_stream(
        self: &Arc<Self>,
        opts: ResumeOptions,
        user_id: String,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(256);
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.run_resume(&opts, &user_id, &tx).await {
                tracing::error!(error = %e, "resume stream failed");
                let _ = tx
                    .send(StreamEvent::error(e.to_string(), Some(e.code())))
                    .await;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });
        rx
    }

    // ── Ask mode ───────────────────────────────────────────────────

    async fn run_ask(
        &self,
        opts: &StreamOptions,
        user_id: &str,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let start = Instant::now();

        // Conversation continuity lives in the turn store; the thread
        // ID only keys this request's checkpoint for interrupt/resume.
        let session_id = opts
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let thread_id = uuid::Uuid::new_v4().to_string();

        let resolved = self.llm.resolve(opts.provider.as_deref(), opts.model.as_deref())?;

        tracing::info!(
            query = %head(&opts.query, 200),
            session_id = %session_id,
            thread_id = %thread_id,
            provider = %resolved.provider_name,
            model = %resolved.model,
            "streaming query started"
        );

        // Load bounded history and the previous turn's guardrail score.
        let turns = self
            .conversations
            .get_history(&session_id, opts.conversation_window, user_id)
            .await?;
        let mut history = Vec::with_capacity(turns.len() * 2);
        for t in &turns {
            history.push(ConversationMessage::user(&t.user_query));
            history.push(ConversationMessage::assistant(&t.agent_response));
        }
        let last_guardrail_score = turns.last().and_then(|t| t.guardrail_score);
        tracing::debug!(session_id = %session_id, turns = turns.len(), "loaded conversation history");

        let ctx = self.build_context(opts, &resolved, user_id)?;
        let state = AgentState::new(
            &opts.query,
            &session_id,
            &thread_id,
            history,
            last_guardrail_score,
            opts.guardrail_threshold,
            opts.top_k,
            opts.max_iterations,
        );

        let cancel = self.tasks.register(&session_id);
        let graph = Graph::new(ctx, self.checkpoints.clone());
        let agent_rx = graph.spawn(state, cancel.clone());

        let mut translator = Translator {
            answer: String::new(),
            content_tokens: 0,
            sources_emitted: false,
            top_k: opts.top_k,
            threshold: opts.guardrail_threshold,
        };
        let outcome = consume_run(agent_rx, tx, &mut translator).await;
        self.tasks.remove(&session_id);

        match outcome {
            RunOutcome::Interrupted {
                papers,
                proposed_ids,
                state,
            } => {
                // Confirm event, partial turn with the HITL snapshot,
                // then metadata; no answer was generated.
                let _ = tx
                    .send(StreamEvent::ConfirmIngest(ConfirmIngestData {
                        papers: papers.clone(),
                        session_id: session_id.clone(),
                        thread_id: thread_id.clone(),
                    }))
                    .await;

                // At most one turn per session may carry a pending
                // confirmation; an abandoned older one is superseded.
                if let Some(stale) = self
                    .conversations
                    .get_pending_turn(&session_id, user_id)
                    .await?
                {
                    tracing::warn!(
                        session_id = %session_id,
                        turn_number = stale.turn_number,
                        "superseding abandoned pending confirmation"
                    );
                    self.conversations
                        .clear_pending_confirmation(&session_id, stale.turn_number, user_id)
                        .await?;
                }

                let turn = self
                    .conversations
                    .save_turn(
                        &session_id,
                        TurnData {
                            user_query: opts.query.clone(),
                            agent_response: String::new(),
                            provider: resolved.provider_name.clone(),
                            model: resolved.model.clone(),
                            guardrail_score: state.meta.guardrail_score,
                            retrieval_attempts: state.retrieval_attempts,
                            rewritten_query: state.rewritten_query.clone(),
                            reasoning_steps: Some(state.meta.reasoning_steps.clone()),
                            pending_confirmation: Some(PendingConfirmation {
                                papers,
                                proposed_ids,
                                provider: resolved.provider_name.clone(),
                                model: resolved.model.clone(),
                                temperature: opts.temperature,
                                thread_id: thread_id.clone(),
                            }),
                            ..Default::default()
                        },
                        user_id,
                    )
                    .await?;

                self.emit_metadata(tx, opts, &resolved, &state, &session_id, turn.turn_number, start)
                    .await;
                Ok(())
            }

            RunOutcome::Finished(state) => {
                let answer = state
                    .final_answer()
                    .map(String::from)
                    .unwrap_or_else(|| translator.answer.clone());

                if cancel.is_cancelled() {
                    // E6 semantics: persist whatever accumulated, then
                    // the wrapper's `done` ends the stream immediately.
                    self.persist_answer_turn(&session_id, &opts.query, &answer, &resolved, &state, user_id)
                        .await?;
                    tracing::info!(session_id = %session_id, "stream cancelled, partial turn saved");
                    return Ok(());
                }

                // Fallback: a non-empty answer with zero streamed
                // tokens is emitted as one synthetic content event.
                if translator.content_tokens == 0 && !answer.is_empty() {
                    tracing::warn!(
                        answer_len = answer.len(),
                        session_id = %session_id,
                        "content token fallback triggered"
                    );
                    let _ = tx
                        .send(StreamEvent::Content(ContentData {
                            token: answer.clone(),
                        }))
                        .await;
                }

                self.emit_citations(tx, &state).await;

                let turn = self
                    .persist_answer_turn(&session_id, &opts.query, &answer, &resolved, &state, user_id)
                    .await?;

                tracing::info!(
                    session_id = %session_id,
                    iterations = state.iteration,
                    guardrail_score = ?state.meta.guardrail_score,
                    turn_number = turn,
                    answer_len = answer.len(),
                    "streaming query complete"
                );

                self.emit_metadata(tx, opts, &resolved, &state, &session_id, turn, start)
                    .await;
                Ok(())
            }

            // The failure event is already on the wire.
            RunOutcome::Failed => Ok(()),
        }
    }

    // ── Resume mode ────────────────────────────────────────────────

    async fn run_resume(
        &self,
        opts: &ResumeOptions,
        user_id: &str,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let start = Instant::now();

        let Some(pending_turn) = self
            .conversations
            .get_pending_turn(&opts.session_id, user_id)
            .await?
        else {
            let _ = tx
                .send(StreamEvent::error(
                    "no pending confirmation for this session",
                    Some("DOUBLE_CONFIRM"),
                ))
                .await;
            return Ok(());
        };
        let Some(pc) = pending_turn.pending_confirmation.clone() else {
            let _ = tx
                .send(StreamEvent::error(
                    "no pending confirmation for this session",
                    Some("DOUBLE_CONFIRM"),
                ))
                .await;
            return Ok(());
        };

        let _ = tx
            .send(StreamEvent::status(
                "resume",
                if opts.approved {
                    "Resuming with approved ingestion..."
                } else {
                    "Resuming after declined ingestion..."
                },
            ))
            .await;

        // Approved: run the ingestion side effect inline before the
        // graph resumes, so retrieval can see the new papers.
        let mut ingest_summary = None;
        if opts.approved {
            if let Some(ingest) = &self.ingest {
                let report = ingest
                    .ingest_by_ids(&opts.selected_ids, false, user_id)
                    .await;
                let _ = tx
                    .send(StreamEvent::IngestComplete(IngestCompleteData {
                        papers_processed: report.papers_processed,
                        chunks_created: report.chunks_created,
                        duration_seconds: report.duration_seconds,
                        errors: report.errors.iter().map(|e| e.error.clone()).collect(),
                    }))
                    .await;
                ingest_summary = Some(serde_json::to_value(&report)?);
            } else {
                tracing::warn!("resume approved but no ingest service configured");
            }
        }

        let resolved = self
            .llm
            .resolve(Some(pc.provider.as_str()), Some(pc.model.as_str()))?;
        let ctx = self.build_context(
            &StreamOptions {
                query: String::new(),
                provider: Some(pc.provider.clone()),
                model: Some(pc.model.clone()),
                top_k: self.defaults.top_k,
                guardrail_threshold: self.defaults.guardrail_threshold,
                max_retrieval_attempts: self.defaults.max_retrieval_attempts,
                max_iterations: self.defaults.max_iterations,
                temperature: pc.temperature,
                timeout_seconds: None,
                session_id: Some(opts.session_id.clone()),
                conversation_window: self.defaults.conversation_window,
            },
            &resolved,
            user_id,
        )?;

        let graph = Graph::new(ctx, self.checkpoints.clone());
        let decision = ResumeDecision {
            approved: opts.approved,
            selected_ids: opts.selected_ids.clone(),
            ingest_summary,
        };
        let resumed = match graph.prepare_resume(&opts.thread_id, &decision) {
            Ok(state) => state,
            Err(e) => {
                // The snapshot aged out: clear the stale pending flag
                // so the conversation can move on.
                tracing::warn!(thread_id = %opts.thread_id, error = %e, "checkpoint missing on resume");
                self.conversations
                    .clear_pending_confirmation(
                        &opts.session_id,
                        pending_turn.turn_number,
                        user_id,
                    )
                    .await?;
                let _ = tx
                    .send(StreamEvent::error(
                        "confirmation expired; please ask again",
                        Some("CHECKPOINT_EXPIRED"),
                    ))
                    .await;
                return Ok(());
            }
        };

        self.conversations
            .clear_pending_confirmation(&opts.session_id, pending_turn.turn_number, user_id)
            .await?;

        let cancel = self.tasks.register(&opts.session_id);
        let agent_rx = graph.spawn(resumed, cancel.clone());

        let mut translator = Translator {
            answer: String::new(),
            content_tokens: 0,
            sources_emitted: false,
            top_k: self.defaults.top_k,
            threshold: self.defaults.guardrail_threshold,
        };
        let outcome = consume_run(agent_rx, tx, &mut translator).await;
        self.tasks.remove(&opts.session_id);

        let confirmation_query = if opts.approved {
            format!(
                "Approved ingestion of {} papers",
                opts.selected_ids.len()
            )
        } else {
            "Declined the proposed ingestion".to_string()
        };

        match outcome {
            RunOutcome::Finished(state) => {
                let answer = state
                    .final_answer()
                    .map(String::from)
                    .unwrap_or_else(|| translator.answer.clone());

                if cancel.is_cancelled() {
                    self.persist_answer_turn(
                        &opts.session_id,
                        &confirmation_query,
                        &answer,
                        &resolved,
                        &state,
                        user_id,
                    )
                    .await?;
                    return Ok(());
                }

                if translator.content_tokens == 0 && !answer.is_empty() {
                    tracing::warn!(answer_len = answer.len(), "content token fallback triggered");
                    let _ = tx
                        .send(StreamEvent::Content(ContentData {
                            token: answer.clone(),
                        }))
                        .await;
                }

                self.emit_citations(tx, &state).await;

                let turn = self
                    .persist_answer_turn(
                        &opts.session_id,
                        &confirmation_query,
                        &answer,
                        &resolved,
                        &state,
                        user_id,
                    )
                    .await?;

                let _ = tx
                    .send(StreamEvent::Metadata(MetadataData {
                        query: confirmation_query,
                        execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                        retrieval_attempts: state.retrieval_attempts,
                        rewritten_query: state.rewritten_query.clone(),
                        guardrail_score: state.meta.guardrail_score,
                        provider: resolved.provider_name.clone(),
                        model: resolved.model.clone(),
                        session_id: Some(opts.session_id.clone()),
                        turn_number: turn,
                        reasoning_steps: state.meta.reasoning_steps.clone(),
                        trace_id: None,
                    }))
                    .await;
                Ok(())
            }
            RunOutcome::Interrupted { .. } => {
                // A resumed run proposing again is not supported; the
                // checkpoint was already consumed.
                let _ = tx
                    .send(StreamEvent::error(
                        "agent paused again during resume",
                        Some("INTERNAL_ERROR"),
                    ))
                    .await;
                Ok(())
            }
            RunOutcome::Failed => Ok(()),
        }
    }

    // ── Shared helpers ─────────────────────────────────────────────

    /// Assemble the per-request agent context: resolved model, a fresh
    /// tool registry scoped to this user, and validated tunables.
    fn build_context(
        &self,
        opts: &StreamOptions,
        resolved: &quill_providers::ResolvedModel,
        user_id: &str,
    ) -> Result<Arc<AgentContext>> {
        let search = Arc::new(SearchService::new(
            self.embedder.clone(),
            self.chunks.clone(),
            self.search_config.clone(),
        ));

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(RetrieveChunksTool::new(
            search,
            RETRIEVE_DEFAULT_TOP_K,
            user_id,
        )))?;
        if let Some(rc) = &self.registry_client {
            tools.register(Arc::new(ArxivSearchTool::new(rc.clone())))?;
        }
        tools.register(Arc::new(ListPapersTool::new(self.papers.clone(), user_id)))?;
        tools.register(Arc::new(ExploreCitationsTool::new(
            self.papers.clone(),
            user_id,
        )))?;
        tools.register(Arc::new(ProposeIngestTool::new(
            self.papers.clone(),
            user_id,
        )))?;
        if self.ingest.is_some() {
            tools.register(Arc::new(IngestPapersTool::new(
                self.ingest.clone(),
                user_id,
            )))?;
        }

        let llm_timeout = opts
            .timeout_seconds
            .map(Duration::from_secs_f64)
            .unwrap_or(self.llm_timeout);

        Ok(Arc::new(AgentContext {
            llm: resolved.provider.clone(),
            provider_name: resolved.provider_name.clone(),
            model: resolved.model.clone(),
            tools,
            formatter: ConversationFormatter::new(opts.conversation_window),
            guardrail_threshold: opts.guardrail_threshold,
            top_k: opts.top_k,
            max_retrieval_attempts: opts.max_retrieval_attempts,
            max_iterations: opts.max_iterations,
            temperature: opts.temperature,
            max_generation_tokens: self.defaults.max_generation_tokens,
            llm_timeout,
        }))
    }

    async fn persist_answer_turn(
        &self,
        session_id: &str,
        user_query: &str,
        answer: &str,
        resolved: &quill_providers::ResolvedModel,
        state: &AgentState,
        user_id: &str,
    ) -> Result<i64> {
        let sources: Vec<SourceInfo> = state
            .relevant_chunks
            .iter()
            .take(state.meta.top_k)
            .map(SourceInfo::from)
            .collect();

        let turn = self
            .conversations
            .save_turn(
                session_id,
                TurnData {
                    user_query: user_query.to_string(),
                    agent_response: answer.to_string(),
                    provider: resolved.provider_name.clone(),
                    model: resolved.model.clone(),
                    guardrail_score: state.meta.guardrail_score,
                    retrieval_attempts: state.retrieval_attempts,
                    rewritten_query: state.rewritten_query.clone(),
                    sources: if sources.is_empty() {
                        None
                    } else {
                        Some(sources)
                    },
                    reasoning_steps: Some(state.meta.reasoning_steps.clone()),
                    ..Default::default()
                },
                user_id,
            )
            .await?;
        Ok(turn.turn_number)
    }

    /// Surface a citation graph when the citation-exploration tool ran
    /// this turn.
    async fn emit_citations(&self, tx: &mpsc::Sender<StreamEvent>, state: &AgentState) {
        let Some(output) = state
            .tool_outputs
            .iter()
            .rev()
            .find(|o| o.tool_name == EXPLORE_CITATIONS)
        else {
            return;
        };
        let arxiv_id = output
            .data
            .get("arxiv_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let title = output
            .data
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let references: Vec<String> = output
            .data
            .get("references")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let _ = tx
            .send(StreamEvent::Citations(CitationsData::new(
                arxiv_id, title, references,
            )))
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_metadata(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        opts: &StreamOptions,
        resolved: &quill_providers::ResolvedModel,
        state: &AgentState,
        session_id: &str,
        turn_number: i64,
        start: Instant,
    ) {
        let _ = tx
            .send(StreamEvent::Metadata(MetadataData {
                query: opts.query.clone(),
                execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                retrieval_attempts: state.retrieval_attempts,
                rewritten_query: state.rewritten_query.clone(),
                guardrail_score: state.meta.guardrail_score,
                provider: resolved.provider_name.clone(),
                model: resolved.model.clone(),
                session_id: Some(session_id.to_string()),
                turn_number,
                reasoning_steps: state.meta.reasoning_steps.clone(),
                trace_id: None,
            }))
            .await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Consume the graph's event stream, translating each event into the
/// external contract until a terminal event arrives.
async fn consume_run(
    mut agent_rx: mpsc::Receiver<AgentEvent>,
    tx: &mpsc::Sender<StreamEvent>,
    translator: &mut Translator,
) -> RunOutcome {
    while let Some(event) = agent_rx.recv().await {
        match event {
            AgentEvent::NodeStart { node } => {
                // The executor's story is told by tool events.
                if node != NodeTag::Executor {
                    let _ = tx
                        .send(StreamEvent::status(node.step(), node.start_message()))
                        .await;
                }
            }

            AgentEvent::NodeEnd { node, summary } => match summary {
                NodeSummary::Classified {
                    intent,
                    scope_score,
                    tools,
                    iteration,
                    reasoning,
                } => {
                    let in_scope = scope_score >= translator.threshold;
                    let _ = tx
                        .send(StreamEvent::status_with(
                            node.step(),
                            format!(
                                "Query {} - decided to {intent}",
                                if in_scope { "is in scope" } else { "is out of scope" }
                            ),
                            serde_json::json!({
                                "intent": intent,
                                "score": scope_score,
                                "threshold": translator.threshold,
                                "tools": tools,
                                "iteration": iteration,
                                "reasoning": reasoning,
                            }),
                        ))
                        .await;
                }
                NodeSummary::Evaluated {
                    relevant, total, ..
                } => {
                    let _ = tx
                        .send(StreamEvent::status_with(
                            node.step(),
                            format!("Found {} relevant documents", relevant.len()),
                            serde_json::json!({
                                "relevant": relevant.len(),
                                "total": total,
                            }),
                        ))
                        .await;

                    // One sources event per turn, right after the
                    // evaluation that produced relevant chunks.
                    if !translator.sources_emitted && !relevant.is_empty() {
                        let sources: Vec<SourceInfo> = relevant
                            .iter()
                            .take(translator.top_k)
                            .map(SourceInfo::from)
                            .collect();
                        let _ = tx
                            .send(StreamEvent::Sources(SourcesData { sources }))
                            .await;
                        translator.sources_emitted = true;
                    }
                }
                NodeSummary::Generated => {
                    let _ = tx
                        .send(StreamEvent::status(node.step(), "Generation complete"))
                        .await;
                }
                NodeSummary::OutOfScope => {}
            },

            AgentEvent::ToolStart { tool_name, args } => {
                let _ = tx
                    .send(StreamEvent::status_with(
                        "executing",
                        format!("Calling {tool_name}..."),
                        serde_json::json!({ "tool_name": tool_name, "args": args }),
                    ))
                    .await;
            }
            AgentEvent::ToolEnd { tool_name, success } => {
                let status = if success { "completed" } else { "failed" };
                let _ = tx
                    .send(StreamEvent::status_with(
                        "executing",
                        format!("{tool_name} {status}"),
                        serde_json::json!({ "tool_name": tool_name, "success": success }),
                    ))
                    .await;
            }

            AgentEvent::Token { text } => {
                translator.content_tokens += 1;
                translator.answer.push_str(&text);
                let _ = tx
                    .send(StreamEvent::Content(ContentData { token: text }))
                    .await;
            }

            AgentEvent::Interrupted {
                papers,
                proposed_ids,
                state,
            } => {
                return RunOutcome::Interrupted {
                    papers,
                    proposed_ids,
                    state,
                };
            }
            AgentEvent::Finished { state } => return RunOutcome::Finished(state),
            AgentEvent::Failed { error, code } => {
                let _ = tx.send(StreamEvent::error(error, Some(code))).await;
                return RunOutcome::Failed;
            }
        }
    }
    RunOutcome::Failed
}

fn head(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
