//! Process-wide registry of in-flight agent runs, keyed by session.
//!
//! Only the owning request registers and removes; any request may
//! cancel. Cancellation is cooperative: the graph loop and generation
//! nodes observe the token and wind down, and the consumer still emits
//! a final `done` event.

use std::collections::HashMap;

use parking_lot::Mutex;

use quill_agent::CancelToken;

#[derive(Default)]
pub struct TaskRegistry {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a cancel token for a session's run.
    pub fn register(&self, session_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(session_id.to_string(), token.clone());
        token
    }

    /// Cancel the running stream for a session. Returns `true` if a
    /// run was found. Idempotent: cancelling twice is harmless.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token when a run completes.
    pub fn remove(&self, session_id: &str) {
        self.tokens.lock().remove(session_id);
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.tokens.lock().contains_key(session_id)
    }
}
