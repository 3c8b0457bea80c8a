/// Shared error type used across all Quill crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("{provider} timed out after {seconds:.1}s")]
    Timeout { provider: String, seconds: f64 },

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("store: {0}")]
    Store(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("checkpoint: {0}")]
    Checkpoint(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short stable code for in-band SSE error events.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Timeout { .. } => "TIMEOUT",
            Error::Provider { .. } => "PROVIDER_ERROR",
            Error::Store(_) => "STORE_ERROR",
            Error::ToolNotFound(_) | Error::Tool { .. } => "TOOL_ERROR",
            Error::Checkpoint(_) => "CHECKPOINT_EXPIRED",
            Error::Auth(_) => "AUTH_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            _ => "INTERNAL_ERROR",
        }
    }
}
