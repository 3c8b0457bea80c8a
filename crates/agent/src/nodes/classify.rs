//! Classify-and-route: one LLM call deciding scope and the next action.
//!
//! Layered so each layer can short-circuit the next: injection scan,
//! conversational fast path, iteration guard, LLM call, dedup guard.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use quill_domain::error::Result;
use quill_providers::generate_structured;

use crate::context::AgentContext;
use crate::prompts::classify_and_route_prompt;
use crate::security::{scan_for_injection, ScanResult};
use crate::state::{AgentState, ClassificationResult, Intent, ToolCallRequest};

static SHORT_FOLLOWUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(yes|no|explain|tell me more|why|how|what about|go on|continue)[.!?\s]*$")
        .unwrap()
});

pub async fn classify_and_route(state: &mut AgentState, ctx: &AgentContext) -> Result<()> {
    let query = state.current_query();
    if state.original_query.is_empty() {
        state.original_query = query.clone();
    }
    let is_rewrite = state.iteration > 0;

    // ── Layer 1: injection scan (always) ───────────────────────────
    let scan = scan_for_injection(&query);
    if scan.is_suspicious {
        tracing::warn!(
            patterns = ?scan.matched_patterns,
            query = %head(&query, 100),
            "injection pattern detected"
        );
    }

    // ── Layer 2: fast path for short conversational follow-ups ─────
    let prior_in_scope = state
        .meta
        .last_guardrail_score
        .map_or(true, |score| score >= state.meta.guardrail_threshold);
    if !state.conversation_history.is_empty()
        && SHORT_FOLLOWUP.is_match(&query)
        && !scan.is_suspicious
        && prior_in_scope
        && !is_rewrite
    {
        let result = ClassificationResult::direct(100, "conversational follow-up");
        state.push_reasoning(format!(
            "Validated query scope (score: {}/100)",
            result.scope_score
        ));
        state.meta.guardrail_score = Some(result.scope_score);
        state.meta.injection_scan = Some(ScanResult {
            is_suspicious: false,
            matched_patterns: Vec::new(),
        });
        state.router_decision = Some(result.clone());
        state.classification_result = Some(result);
        return Ok(());
    }

    // ── Layer 3: iteration guard ───────────────────────────────────
    let new_iteration = state.iteration + 1;
    if new_iteration > state.max_iterations {
        tracing::warn!(
            iteration = new_iteration,
            max = state.max_iterations,
            "classify_and_route max iterations reached"
        );
        let result = ClassificationResult::direct(
            state.meta.guardrail_score.unwrap_or(100),
            format!(
                "Max iterations ({}) reached, generating response.",
                state.max_iterations
            ),
        );
        state.push_reasoning(format!(
            "Classification (iteration {new_iteration}): forced direct (max iterations)"
        ));
        state.iteration = new_iteration;
        state.router_decision = Some(result.clone());
        state.classification_result = Some(result);
        return Ok(());
    }

    // ── Layer 4: LLM classification + routing ──────────────────────
    let topic_context = ctx
        .formatter
        .format_as_topic_context(&state.conversation_history);
    let prior_scope_score = if is_rewrite {
        state.meta.guardrail_score
    } else {
        None
    };

    let (system, user) = classify_and_route_prompt(
        &query,
        &ctx.tools.all_schemas(),
        &topic_context,
        scan.is_suspicious,
        state.meta.guardrail_threshold,
        &state.tool_history,
        is_rewrite,
    );

    tracing::debug!(
        query = %head(&query, 100),
        iteration = new_iteration,
        is_rewrite,
        "classify_and_route calling LLM"
    );

    let mut result: ClassificationResult = generate_structured(
        ctx.llm.as_ref(),
        &system,
        &user,
        Some(ctx.model.clone()),
        ctx.llm_timeout,
    )
    .await?;

    // Rewrite iterations do not re-score scope: carry the prior score
    // forward and discard whatever the LLM produced.
    if let Some(prior) = prior_scope_score {
        result.scope_score = prior;
    }

    // Execute with nothing to execute is a direct answer.
    if result.intent == Intent::Execute && result.tool_calls.is_empty() {
        result.intent = Intent::Direct;
    }

    // ── Layer 5: dedup guard ───────────────────────────────────────
    if result.intent == Intent::Execute && !state.tool_history.is_empty() {
        result = apply_dedup_guard(state, ctx, result);
    }

    tracing::info!(
        intent = ?result.intent,
        scope_score = result.scope_score,
        tool_count = result.tool_calls.len(),
        tools = ?result.tool_calls.iter().map(|tc| &tc.tool_name).collect::<Vec<_>>(),
        iteration = new_iteration,
        reasoning = %head(&result.reasoning, 100),
        "classify_and_route result"
    );

    let tools_str = result
        .tool_calls
        .iter()
        .map(|tc| tc.tool_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    state.push_reasoning(
        format!(
            "Classification (iteration {new_iteration}): intent={:?} score={} {tools_str}",
            result.intent, result.scope_score
        )
        .trim_end()
        .to_string(),
    );

    state.iteration = new_iteration;
    state.meta.guardrail_score = Some(result.scope_score);
    state.meta.injection_scan = Some(scan);
    state.router_decision = Some(result.clone());
    state.classification_result = Some(result);
    Ok(())
}

/// Strip tool calls that would repeat work already done this turn.
///
/// A call is blocked when its tool already succeeded and either the
/// tool is not chunk-producing (one-shot semantics), or it is
/// chunk-producing and the arguments match a succeeded call exactly
/// (chunk tools are retry-friendly with novel arguments).
fn apply_dedup_guard(
    state: &AgentState,
    ctx: &AgentContext,
    result: ClassificationResult,
) -> ClassificationResult {
    let succeeded_names: HashSet<&str> = state
        .tool_history
        .iter()
        .filter(|t| t.success)
        .map(|t| t.tool_name.as_str())
        .collect();

    let is_blocked = |tc: &ToolCallRequest| -> bool {
        if !succeeded_names.contains(tc.tool_name.as_str()) {
            return false;
        }
        let extends_chunks = ctx
            .tools
            .get(&tc.tool_name)
            .is_some_and(|t| t.extends_chunks());
        if !extends_chunks {
            return true;
        }
        let args: serde_json::Value =
            serde_json::from_str(&tc.tool_args_json).unwrap_or(serde_json::json!({}));
        state
            .tool_history
            .iter()
            .any(|t| t.success && t.tool_name == tc.tool_name && t.tool_args == args)
    };

    let (novel, blocked): (Vec<_>, Vec<_>) =
        result.tool_calls.iter().cloned().partition(|tc| !is_blocked(tc));

    if novel.is_empty() {
        tracing::info!(
            requested = ?result.tool_calls.iter().map(|tc| &tc.tool_name).collect::<Vec<_>>(),
            "all requested tools already succeeded, forcing direct"
        );
        ClassificationResult {
            intent: Intent::Direct,
            tool_calls: Vec::new(),
            scope_score: result.scope_score,
            reasoning: "All requested tools already succeeded. \
                        Generating response from existing results."
                .into(),
        }
    } else if !blocked.is_empty() {
        tracing::info!(
            kept = ?novel.iter().map(|tc| &tc.tool_name).collect::<Vec<_>>(),
            stripped = ?blocked.iter().map(|tc| &tc.tool_name).collect::<Vec<_>>(),
            "stripped duplicate tool calls"
        );
        ClassificationResult {
            tool_calls: novel,
            ..result
        }
    } else {
        result
    }
}

fn head(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
