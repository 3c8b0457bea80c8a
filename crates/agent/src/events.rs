//! Events flowing from the graph driver to the stream service.

use serde_json::Value;

use quill_domain::paper::Chunk;
use quill_domain::stream::ProposalPaper;

use crate::state::AgentState;

/// Graph node tags. The executor emits tool events instead of node
/// events, so it never appears in `NodeStart`/`NodeEnd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTag {
    ClassifyAndRoute,
    OutOfScope,
    Executor,
    Evaluate,
    Generate,
}

impl NodeTag {
    /// Step name used in `status` events.
    pub fn step(&self) -> &'static str {
        match self {
            NodeTag::ClassifyAndRoute => "classify",
            NodeTag::OutOfScope => "out_of_scope",
            NodeTag::Executor => "executing",
            NodeTag::Evaluate => "evaluate",
            NodeTag::Generate => "generate",
        }
    }

    /// Human-readable message for the node-start status event.
    pub fn start_message(&self) -> &'static str {
        match self {
            NodeTag::ClassifyAndRoute => "Classifying query and deciding next action...",
            NodeTag::OutOfScope => "Generating out-of-scope response...",
            NodeTag::Executor => "Executing tools...",
            NodeTag::Evaluate => "Evaluating retrieved documents...",
            NodeTag::Generate => "Generating answer...",
        }
    }
}

/// Rich node-completion summary for detailed status events.
#[derive(Debug, Clone)]
pub enum NodeSummary {
    Classified {
        intent: String,
        scope_score: u8,
        tools: Vec<String>,
        iteration: u32,
        reasoning: String,
    },
    Evaluated {
        /// Relevant chunks after this evaluation, already trimmed for
        /// source emission.
        relevant: Vec<Chunk>,
        total: usize,
        sufficient: bool,
    },
    Generated,
    OutOfScope,
}

/// Events emitted while the graph runs. Exactly one terminal event
/// (`Interrupted`, `Finished`, or `Failed`) ends every run.
#[derive(Debug)]
pub enum AgentEvent {
    NodeStart {
        node: NodeTag,
    },
    NodeEnd {
        node: NodeTag,
        summary: NodeSummary,
    },
    ToolStart {
        tool_name: String,
        args: Value,
    },
    ToolEnd {
        tool_name: String,
        success: bool,
    },
    /// One generated answer token.
    Token {
        text: String,
    },
    /// HITL pause: the state has been checkpointed under its thread ID.
    Interrupted {
        papers: Vec<ProposalPaper>,
        proposed_ids: Vec<String>,
        state: Box<AgentState>,
    },
    /// Normal completion; carries the final state for persistence.
    Finished {
        state: Box<AgentState>,
    },
    /// The run failed; the stream boundary turns this into an in-band
    /// error event followed by done.
    Failed {
        error: String,
        code: &'static str,
    },
}
