//! LLM and embeddings provider adapters.
//!
//! The rest of the system talks to models through two seams:
//! [`LlmProvider`] for chat completions (full and token-streaming) and
//! [`Embedder`] for text embeddings. The only shipped adapter targets
//! OpenAI-compatible endpoints, which covers OpenAI itself plus the
//! usual self-hosted gateways that speak the same wire format.

pub mod embeddings;
pub mod openai_compat;
pub mod registry;
mod sse;
pub mod structured;
pub mod traits;
pub mod util;

pub use embeddings::EmbeddingsClient;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderRegistry, ResolvedModel};
pub use structured::{generate_structured, with_llm_timeout};
pub use traits::{
    ChatMessage, ChatRequest, ChatResponse, Embedder, LlmProvider, ProviderEvent, Role, Usage,
};
