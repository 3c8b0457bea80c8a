//! Stream-contract tests against the service layer: event ordering,
//! turn persistence, resume error paths, and cancellation -- all with
//! an in-memory database and a scripted provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;

use quill_agent::CheckpointStore;
use quill_domain::config::{AgentConfig, SearchConfig};
use quill_domain::error::{Error, Result};
use quill_domain::paper::PaperMeta;
use quill_domain::stream::{BoxStream, StreamEvent};
use quill_gateway::runtime::{ResumeOptions, StreamOptions, StreamService, TaskRegistry};
use quill_providers::{
    ChatRequest, ChatResponse, Embedder, LlmProvider, ProviderEvent, ProviderRegistry,
};
use quill_store::chunk::NewChunk;
use quill_store::{
    ChunkStore, ConversationStore, Db, PaperStore, PendingConfirmation, TurnData,
};

const USER: &str = "11111111-1111-1111-1111-111111111111";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ScriptedLlm {
    chat_responses: Mutex<VecDeque<String>>,
    stream_responses: Mutex<VecDeque<Vec<String>>>,
    chat_calls: AtomicUsize,
    token_delay: Option<Duration>,
}

impl ScriptedLlm {
    fn new(chat: Vec<String>, streams: Vec<Vec<&str>>) -> Self {
        Self {
            chat_responses: Mutex::new(chat.into_iter().collect()),
            stream_responses: Mutex::new(
                streams
                    .into_iter()
                    .map(|t| t.into_iter().map(String::from).collect())
                    .collect(),
            ),
            chat_calls: AtomicUsize::new(0),
            token_delay: None,
        }
    }

    fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .chat_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Provider {
                provider: "scripted".into(),
                message: "chat script exhausted".into(),
            })?;
        Ok(ChatResponse {
            content,
            usage: None,
            model: "scripted-model".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ProviderEvent>>> {
        let tokens = self
            .stream_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec!["ok".into()]);
        let delay = self.token_delay;
        let mut events: Vec<Result<ProviderEvent>> = tokens
            .into_iter()
            .map(|text| Ok(ProviderEvent::Token { text }))
            .collect();
        events.push(Ok(ProviderEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        }));
        Ok(Box::pin(futures_util::stream::iter(events).then(
            move |event| async move {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                event
            },
        )))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

struct FakeEmbedder;

#[async_trait::async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("attention") {
                    vec![1.0, 0.0]
                } else {
                    vec![0.0, 1.0]
                }
            })
            .collect())
    }
    fn dimension(&self) -> usize {
        2
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Fixture {
    service: Arc<StreamService>,
    conversations: ConversationStore,
    tasks: Arc<TaskRegistry>,
}

async fn fixture(llm: ScriptedLlm, seed_chunks: bool) -> Fixture {
    let db = Db::in_memory().unwrap();
    let conversations = ConversationStore::new(db.clone());
    let papers = PaperStore::new(db.clone());
    let chunks = ChunkStore::new(db);

    if seed_chunks {
        let meta = PaperMeta {
            arxiv_id: "2401.00001".into(),
            title: "Attention Is All You Need".into(),
            authors: vec!["Vaswani".into()],
            abstract_text: String::new(),
            categories: vec!["cs.LG".into()],
            published_date: Some("2017-06-12".into()),
            pdf_url: PaperMeta::default_pdf_url("2401.00001"),
        };
        papers.upsert(&meta, &[], USER).await.unwrap();
        let paper = papers.get_by_arxiv_id("2401.00001", USER).await.unwrap().unwrap();
        let texts = [
            "multi head attention lets the model attend jointly",
            "scaled dot product attention divides by sqrt dk",
            "positional encodings inject order information",
        ];
        let new_chunks: Vec<NewChunk> = texts
            .iter()
            .map(|t| NewChunk {
                text: t.to_string(),
                section_name: Some("Body".into()),
                page_number: None,
            })
            .collect();
        let embeddings = FakeEmbedder
            .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        chunks
            .replace_for_paper(&paper, USER, &new_chunks, &embeddings)
            .await
            .unwrap();
    }

    let tasks = Arc::new(TaskRegistry::new());
    let service = Arc::new(StreamService {
        llm: Arc::new(ProviderRegistry::with_provider("scripted", Arc::new(llm))),
        embedder: Arc::new(FakeEmbedder),
        search_config: SearchConfig::default(),
        chunks,
        papers,
        conversations: conversations.clone(),
        registry_client: None,
        ingest: None,
        checkpoints: Arc::new(CheckpointStore::new(Duration::from_secs(60))),
        tasks: tasks.clone(),
        defaults: AgentConfig::default(),
        llm_timeout: Duration::from_secs(5),
    });

    Fixture {
        service,
        conversations,
        tasks,
    }
}

fn ask_opts(query: &str, session_id: Option<&str>) -> StreamOptions {
    StreamOptions {
        query: query.into(),
        provider: None,
        model: None,
        top_k: 3,
        guardrail_threshold: 75,
        max_retrieval_attempts: 3,
        max_iterations: 5,
        temperature: 0.3,
        timeout_seconds: None,
        session_id: session_id.map(String::from),
        conversation_window: 5,
    }
}

fn classify_execute(score: u8, tool: &str, args: &str) -> String {
    serde_json::json!({
        "intent": "execute",
        "scope_score": score,
        "tool_calls": [{"tool_name": tool, "tool_args_json": args}],
        "reasoning": "scripted",
    })
    .to_string()
}

fn classify_direct(score: u8) -> String {
    serde_json::json!({
        "intent": "direct",
        "scope_score": score,
        "tool_calls": [],
        "reasoning": "scripted",
    })
    .to_string()
}

fn evaluation(sufficient: bool) -> String {
    serde_json::json!({
        "sufficient": sufficient,
        "reasoning": "scripted",
        "suggested_rewrite": null,
    })
    .to_string()
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn names(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ordering and persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn in_scope_stream_satisfies_event_contract() {
    let llm = ScriptedLlm::new(
        vec![
            classify_execute(95, "retrieve_chunks", r#"{"query":"multi head attention"}"#),
            evaluation(true),
        ],
        vec![vec!["Attention ", "lets models ", "focus."]],
    );
    let f = fixture(llm, true).await;

    let events = drain(
        f.service
            .ask_stream(ask_opts("Explain multi-head attention", Some("s1")), USER.into()),
    )
    .await;
    let event_names = names(&events);

    // First event is a status; done is last; metadata follows all content.
    assert_eq!(event_names.first(), Some(&"status"));
    assert_eq!(event_names.last(), Some(&"done"));
    let last_content = event_names.iter().rposition(|n| *n == "content").unwrap();
    let metadata_pos = event_names.iter().position(|n| *n == "metadata").unwrap();
    assert!(metadata_pos > last_content);

    // Every content token is preceded by at least one status.
    let first_status = event_names.iter().position(|n| *n == "status").unwrap();
    let first_content = event_names.iter().position(|n| *n == "content").unwrap();
    assert!(first_status < first_content);

    // Sources emitted once, after evaluation, bounded by top_k.
    let sources: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Sources(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(sources.len(), 1);
    assert!(sources[0].sources.len() <= 3);
    assert!(sources[0].sources.iter().all(|s| s.was_graded_relevant));

    // Metadata carries the session and attempt count.
    let metadata = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::Metadata(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert_eq!(metadata.session_id.as_deref(), Some("s1"));
    assert_eq!(metadata.turn_number, 0);
    assert_eq!(metadata.retrieval_attempts, 1);
    assert_eq!(metadata.guardrail_score, Some(95));

    // The saved turn matches E1: number 0, sources set, no pending.
    let (_, turns) = f.conversations.get_with_turns("s1", USER).await.unwrap().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].turn_number, 0);
    assert!(turns[0].sources.is_some());
    assert!(turns[0].pending_confirmation.is_none());
    assert_eq!(turns[0].agent_response, "Attention lets models focus.");
}

#[tokio::test]
async fn out_of_scope_stream_has_no_sources() {
    let llm = ScriptedLlm::new(
        vec![classify_direct(30)],
        vec![vec!["I focus on ", "papers."]],
    );
    let f = fixture(llm, false).await;

    let events = drain(
        f.service
            .ask_stream(ask_opts("Best chocolate cake recipe?", Some("s1")), USER.into()),
    )
    .await;
    let event_names = names(&events);

    assert_eq!(event_names.first(), Some(&"status"));
    assert_eq!(event_names.last(), Some(&"done"));
    assert!(!event_names.contains(&"sources"));

    let metadata = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::Metadata(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert!(metadata.guardrail_score.unwrap() < 75);

    let (_, turns) = f.conversations.get_with_turns("s1", USER).await.unwrap().unwrap();
    assert!(!turns[0].agent_response.is_empty());
    assert!(turns[0].sources.is_none());
}

#[tokio::test]
async fn turn_numbers_stay_contiguous_across_streams() {
    let llm = ScriptedLlm::new(
        vec![classify_direct(90), classify_direct(90)],
        vec![vec!["first"], vec!["second"]],
    );
    let f = fixture(llm, false).await;

    drain(f.service.ask_stream(ask_opts("q1", Some("s1")), USER.into())).await;
    drain(f.service.ask_stream(ask_opts("q2", Some("s1")), USER.into())).await;

    let (_, turns) = f.conversations.get_with_turns("s1", USER).await.unwrap().unwrap();
    let numbers: Vec<i64> = turns.iter().map(|t| t.turn_number).collect();
    assert_eq!(numbers, vec![0, 1]);
}

#[tokio::test]
async fn session_id_is_generated_when_absent() {
    let llm = ScriptedLlm::new(vec![classify_direct(90)], vec![vec!["hi"]]);
    let f = fixture(llm, false).await;

    let events = drain(f.service.ask_stream(ask_opts("q", None), USER.into())).await;
    let metadata = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::Metadata(m) => Some(m),
            _ => None,
        })
        .unwrap();
    let session_id = metadata.session_id.clone().unwrap();
    assert!(!session_id.is_empty());

    let (_, turns) = f
        .conversations
        .get_with_turns(&session_id, USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(turns.len(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resume error paths
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn double_confirm_errors_in_band() {
    let llm = ScriptedLlm::new(Vec::new(), Vec::new());
    let f = fixture(llm, false).await;

    let events = drain(f.service.resume_stream(
        ResumeOptions {
            session_id: "s1".into(),
            thread_id: "t1".into(),
            approved: true,
            selected_ids: vec!["A1".into()],
        },
        USER.into(),
    ))
    .await;

    assert_eq!(names(&events), vec!["error", "done"]);
    match &events[0] {
        StreamEvent::Error(e) => assert_eq!(e.code.as_deref(), Some("DOUBLE_CONFIRM")),
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_checkpoint_clears_pending_and_errors() {
    let llm = ScriptedLlm::new(Vec::new(), Vec::new());
    let f = fixture(llm, false).await;

    // A pending turn whose checkpoint never existed (e.g. expired).
    f.conversations
        .save_turn(
            "s1",
            TurnData {
                user_query: "find papers".into(),
                agent_response: String::new(),
                provider: "scripted".into(),
                model: "scripted-model".into(),
                pending_confirmation: Some(PendingConfirmation {
                    papers: vec![],
                    proposed_ids: vec!["A1".into()],
                    provider: "scripted".into(),
                    model: "scripted-model".into(),
                    temperature: 0.3,
                    thread_id: "t-gone".into(),
                }),
                ..Default::default()
            },
            USER,
        )
        .await
        .unwrap();

    let events = drain(f.service.resume_stream(
        ResumeOptions {
            session_id: "s1".into(),
            thread_id: "t-gone".into(),
            approved: false,
            selected_ids: vec![],
        },
        USER.into(),
    ))
    .await;

    let error = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::Error(e) => Some(e),
            _ => None,
        })
        .expect("expected an error event");
    assert_eq!(error.code.as_deref(), Some("CHECKPOINT_EXPIRED"));
    assert_eq!(names(&events).last(), Some(&"done"));

    // The stale pending flag is gone; a retry is a double-confirm.
    assert!(!f.conversations.has_pending_confirmation("s1", USER).await.unwrap());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn cancellation_ends_stream_with_done() {
    let many_tokens: Vec<&str> = (0..200).map(|_| "tok ").collect();
    let llm = ScriptedLlm::new(vec![classify_direct(90)], vec![many_tokens])
        .with_token_delay(Duration::from_millis(5));
    let f = fixture(llm, false).await;

    let mut rx = f
        .service
        .ask_stream(ask_opts("q", Some("s1")), USER.into());

    let mut events = Vec::new();
    let mut cancelled = false;
    let mut events_after_cancel = 0;
    while let Some(event) = rx.recv().await {
        if cancelled && !matches!(event, StreamEvent::Done) {
            events_after_cancel += 1;
        }
        if !cancelled && matches!(event, StreamEvent::Content(_)) {
            assert!(f.tasks.cancel("s1"));
            cancelled = true;
        }
        events.push(event);
    }

    // At most one more event before done, which is last; no metadata.
    assert!(events_after_cancel <= 1, "got {events_after_cancel} events after cancel");
    assert_eq!(names(&events).last(), Some(&"done"));
    assert!(!names(&events).contains(&"metadata"));

    // The partial answer (possibly empty) was persisted.
    let (_, turns) = f.conversations.get_with_turns("s1", USER).await.unwrap().unwrap();
    assert_eq!(turns.len(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failure path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn llm_failure_surfaces_error_then_done() {
    // Empty chat script: the first classification call fails.
    let llm = ScriptedLlm::new(Vec::new(), Vec::new());
    let f = fixture(llm, false).await;

    let events = drain(f.service.ask_stream(ask_opts("q", Some("s1")), USER.into())).await;
    let event_names = names(&events);

    assert!(event_names.contains(&"error"));
    assert_eq!(event_names.last(), Some(&"done"));

    // Failed turns are not persisted.
    assert!(f.conversations.get_with_turns("s1", USER).await.unwrap().is_none());
}
