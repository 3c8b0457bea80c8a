//! Answer generation: streams tokens from the relevant chunks, the
//! accumulated tool outputs, and bounded conversation history.

use futures_util::StreamExt;
use tokio::sync::mpsc;

use quill_domain::error::Result;
use quill_providers::{with_llm_timeout, ChatMessage, ChatRequest, ProviderEvent, Role};

use crate::cancel::CancelToken;
use crate::context::AgentContext;
use crate::events::AgentEvent;
use crate::format::truncate_marked;
use crate::prompts::{PromptBuilder, ANSWER_SYSTEM_PROMPT};
use crate::state::{AgentState, ConversationMessage};

/// Prior messages are clipped to this many characters in the
/// generation prompt.
const HISTORY_MESSAGE_CAP: usize = 500;

pub async fn generate_answer(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &mpsc::Sender<AgentEvent>,
    cancel: &CancelToken,
) -> Result<()> {
    let query = state.original_query.clone();
    let chunks: Vec<_> = state
        .relevant_chunks
        .iter()
        .take(ctx.top_k)
        .cloned()
        .collect();
    let attempts = state.retrieval_attempts;

    tracing::debug!(
        query = %head(&query, 100),
        chunks = chunks.len(),
        history_len = state.conversation_history.len(),
        attempts,
        tool_outputs = state.tool_outputs.len(),
        "generating answer"
    );

    let mut builder = PromptBuilder::new(ANSWER_SYSTEM_PROMPT)
        .with_retrieval_context(&chunks)
        .with_tool_outputs(&state.tool_outputs)
        .with_query(&query, "Question");

    if attempts >= ctx.max_retrieval_attempts && chunks.len() < ctx.top_k {
        builder = builder.with_note("Limited sources found. Acknowledge gaps if needed.");
    }
    let (system, user_prompt) = builder.build();

    // Structured message turns for the bounded history suffix.
    let mut messages = vec![ChatMessage::system(&system)];
    let max_history = ctx.formatter.max_turns * 2;
    let skip = state
        .conversation_history
        .len()
        .saturating_sub(max_history);
    for msg in state.conversation_history.iter().skip(skip) {
        let role = if msg.role == "user" {
            Role::User
        } else {
            Role::Assistant
        };
        messages.push(ChatMessage {
            role,
            content: truncate_marked(&msg.content, HISTORY_MESSAGE_CAP),
        });
    }
    messages.push(ChatMessage::user(&user_prompt));

    tracing::debug!(system_len = system.len(), user_len = user_prompt.len(), "llm prompt");

    let answer = stream_completion(
        ctx,
        ChatRequest {
            messages,
            temperature: Some(ctx.temperature),
            max_tokens: Some(ctx.max_generation_tokens),
            json_mode: false,
            model: Some(ctx.model.clone()),
        },
        events,
        cancel,
    )
    .await?;

    tracing::info!(
        answer_len = answer.len(),
        chunks_used = chunks.len(),
        "answer generated"
    );

    state.messages.push(ConversationMessage::assistant(answer));
    state.push_reasoning("Generated answer with conversation context");
    Ok(())
}

/// Stream one completion, forwarding each token to the event channel
/// and accumulating the full text. Stops early on cancellation,
/// returning what accumulated so far.
pub(crate) async fn stream_completion(
    ctx: &AgentContext,
    req: ChatRequest,
    events: &mpsc::Sender<AgentEvent>,
    cancel: &CancelToken,
) -> Result<String> {
    let mut stream =
        with_llm_timeout(&ctx.provider_name, ctx.llm_timeout, ctx.llm.chat_stream(&req)).await?;

    let mut buf = String::new();
    while let Some(event) = stream.next().await {
        if cancel.is_cancelled() {
            tracing::debug!("generation cancelled mid-stream");
            break;
        }
        match event? {
            ProviderEvent::Token { text } => {
                let _ = events.send(AgentEvent::Token { text: text.clone() }).await;
                buf.push_str(&text);
            }
            ProviderEvent::Done { .. } => break,
        }
    }
    Ok(buf)
}

fn head(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
