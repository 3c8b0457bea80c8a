//! Checkpoint store for interrupted runs.
//!
//! A HITL pause serializes the full agent state keyed by `thread_id`;
//! resume takes it back out. Entries expire after the configured TTL,
//! after which resume surfaces a checkpoint-expired error to the
//! client.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use quill_domain::error::{Error, Result};

use crate::state::AgentState;

struct Entry {
    state_json: String,
    expires_at: Instant,
}

pub struct CheckpointStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl CheckpointStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Serialize and store the state under its thread ID.
    pub fn put(&self, state: &AgentState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            state.thread_id.clone(),
            Entry {
                state_json,
                expires_at: now + self.ttl,
            },
        );
        tracing::debug!(thread_id = %state.thread_id, "checkpoint stored");
        Ok(())
    }

    /// Remove and rehydrate the checkpoint for `thread_id`. Missing or
    /// expired entries are indistinguishable to callers.
    pub fn take(&self, thread_id: &str) -> Result<AgentState> {
        let entry = {
            let mut entries = self.entries.lock();
            let now = Instant::now();
            entries.retain(|_, e| e.expires_at > now);
            entries.remove(thread_id)
        };
        let entry = entry.ok_or_else(|| {
            Error::Checkpoint(format!("no checkpoint for thread {thread_id}"))
        })?;
        let state = serde_json::from_str(&entry.state_json)?;
        tracing::debug!(thread_id, "checkpoint restored");
        Ok(state)
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        let entries = self.entries.lock();
        entries
            .get(thread_id)
            .is_some_and(|e| e.expires_at > Instant::now())
    }
}
