//! Out-of-scope handler: a short context-aware redirection, streamed
//! like any answer. Without a classification to explain, falls back to
//! a fixed one-liner with no LLM call.

use tokio::sync::mpsc;

use quill_domain::error::Result;
use quill_providers::{ChatMessage, ChatRequest};

use crate::cancel::CancelToken;
use crate::context::AgentContext;
use crate::events::AgentEvent;
use crate::nodes::generate::stream_completion;
use crate::prompts::{PromptBuilder, OUT_OF_SCOPE_FALLBACK, OUT_OF_SCOPE_PROMPT};
use crate::state::{AgentState, ConversationMessage};

const OUT_OF_SCOPE_MAX_TOKENS: u32 = 300;
const OUT_OF_SCOPE_TEMPERATURE: f32 = 0.7;

pub async fn out_of_scope(
    state: &mut AgentState,
    ctx: &AgentContext,
    events: &mpsc::Sender<AgentEvent>,
    cancel: &CancelToken,
) -> Result<()> {
    let query = state.original_query.clone();
    let was_suspicious = state
        .meta
        .injection_scan
        .as_ref()
        .is_some_and(|scan| scan.is_suspicious);
    let score = state
        .classification_result
        .as_ref()
        .map(|c| c.scope_score);

    tracing::info!(
        query = %head(&query, 100),
        guardrail_score = ?score,
        was_suspicious,
        "out_of_scope response"
    );

    let message = if let Some(classification) = state.classification_result.clone() {
        let (system, user) = PromptBuilder::new(OUT_OF_SCOPE_PROMPT)
            .with_conversation(&ctx.formatter, &state.conversation_history)
            .with_query(&query, "User message")
            .with_note(&format!("Relevance score: {}/100", classification.scope_score))
            .with_note(&format!("Reason: {}", classification.reasoning))
            .build();

        stream_completion(
            ctx,
            ChatRequest {
                messages: vec![ChatMessage::system(&system), ChatMessage::user(&user)],
                temperature: Some(OUT_OF_SCOPE_TEMPERATURE),
                max_tokens: Some(OUT_OF_SCOPE_MAX_TOKENS),
                json_mode: false,
                model: Some(ctx.model.clone()),
            },
            events,
            cancel,
        )
        .await?
    } else {
        let _ = events
            .send(AgentEvent::Token {
                text: OUT_OF_SCOPE_FALLBACK.to_string(),
            })
            .await;
        OUT_OF_SCOPE_FALLBACK.to_string()
    };

    tracing::info!(message_len = message.len(), "out of scope response generated");
    state.messages.push(ConversationMessage::assistant(message));
    Ok(())
}

fn head(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
