//! Evaluate-batch: one LLM call judging whether retrieved chunks
//! collectively answer the query, with stagnation and empty-set fast
//! paths that skip the LLM entirely.

use quill_domain::error::Result;
use quill_providers::generate_structured;

use crate::context::AgentContext;
use crate::prompts::batch_evaluation_prompt;
use crate::state::{chunk_fingerprints, AgentState, BatchEvaluation};

pub async fn evaluate_batch(state: &mut AgentState, ctx: &AgentContext) -> Result<()> {
    let query = state.current_query();
    let chunk_count = state.retrieved_chunks.len();

    tracing::debug!(query = %head(&query, 100), chunks = chunk_count, "evaluate_batch started");

    // ── Fast path: stagnation ──────────────────────────────────────
    // Identical chunks to the previous iteration would loop forever;
    // accept what is on hand and move on.
    let current_fingerprints = chunk_fingerprints(&state.retrieved_chunks);
    if chunk_count > 0 && current_fingerprints == state.meta.previous_chunk_fingerprints {
        tracing::info!(chunks = chunk_count, iteration = state.iteration, "stagnation detected");
        state.push_reasoning(format!(
            "Evaluated retrieval ({chunk_count} chunks): stagnation detected, promoting all"
        ));
        state.evaluation_result = Some(BatchEvaluation {
            sufficient: true,
            reasoning: "Retrieval returned identical chunks as previous iteration. \
                        Promoting all as best-effort."
                .into(),
            suggested_rewrite: None,
        });
        state.relevant_chunks = state.retrieved_chunks.clone();
        state.meta.previous_chunk_fingerprints = current_fingerprints;
        return Ok(());
    }

    // ── Fast path: nothing retrieved ───────────────────────────────
    if chunk_count == 0 {
        tracing::info!("evaluate_batch: no chunks to evaluate");
        state.push_reasoning("Evaluated retrieval: no chunks retrieved");
        state.evaluation_result = Some(BatchEvaluation {
            sufficient: false,
            reasoning: "No chunks retrieved".into(),
            suggested_rewrite: None,
        });
        state.relevant_chunks = Vec::new();
        return Ok(());
    }

    // ── LLM evaluation ─────────────────────────────────────────────
    let (system, user) = batch_evaluation_prompt(&query, &state.retrieved_chunks);
    let evaluation: BatchEvaluation = generate_structured(
        ctx.llm.as_ref(),
        &system,
        &user,
        Some(ctx.model.clone()),
        ctx.llm_timeout,
    )
    .await?;

    tracing::info!(
        sufficient = evaluation.sufficient,
        total_chunks = chunk_count,
        has_rewrite = evaluation.suggested_rewrite.is_some(),
        reasoning = %head(&evaluation.reasoning, 100),
        "evaluate_batch result"
    );

    if evaluation.sufficient {
        // Already ranked by hybrid search; promote wholesale.
        state.relevant_chunks = state.retrieved_chunks.clone();
        state.push_reasoning(format!("Evaluated retrieval ({chunk_count} chunks): sufficient"));
    } else if state.iteration >= state.max_iterations {
        state.relevant_chunks = state.retrieved_chunks.clone();
        state.push_reasoning(format!(
            "Evaluated retrieval ({chunk_count} chunks): insufficient but max iterations \
             reached, promoting all"
        ));
        tracing::info!(iteration = state.iteration, "max iterations, promoting all chunks");
    } else if let Some(rewrite) = evaluation
        .suggested_rewrite
        .as_ref()
        .filter(|rw| !rw.trim().is_empty())
    {
        state.push_reasoning(format!(
            "Evaluated retrieval ({chunk_count} chunks): insufficient, rewriting to '{}'",
            head(rewrite, 80)
        ));
        tracing::info!(
            original = %head(&query, 80),
            rewritten = %head(rewrite, 80),
            "rewrite suggested"
        );
        state.rewritten_query = Some(rewrite.clone());
        state.relevant_chunks = Vec::new();
    } else {
        // Insufficient with no rewrite to try: best-effort promotion.
        state.relevant_chunks = state.retrieved_chunks.clone();
        state.push_reasoning(format!(
            "Evaluated retrieval ({chunk_count} chunks): insufficient, no rewrite suggested, \
             promoting all"
        ));
    }

    state.evaluation_result = Some(evaluation);
    state.meta.previous_chunk_fingerprints = current_fingerprints;
    Ok(())
}

fn head(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
