//! In-process idempotency store for mutating endpoints.
//!
//! Driven by a caller-supplied `Idempotency-Key` header: the first
//! caller acquires the key, duplicates receive the cached response,
//! and failures release the key so the operation can be retried. For
//! multi-instance deployments, swap in a shared store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    InProgress,
    Completed,
}

#[derive(Clone)]
struct Entry {
    status: EntryStatus,
    response: Option<serde_json::Value>,
    created_at: Instant,
}

/// What `acquire` found for a key.
pub enum Acquired {
    /// The key is new; proceed with the operation.
    New,
    /// The operation is still running elsewhere.
    InProgress,
    /// The operation already completed with this cached response.
    Completed(Option<serde_json::Value>),
}

pub struct IdempotencyStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Try to acquire the key for a new operation.
    pub fn acquire(&self, key: &str) -> Acquired {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.created_at) < self.ttl);

        match entries.get(key) {
            Some(entry) => match entry.status {
                EntryStatus::InProgress => Acquired::InProgress,
                EntryStatus::Completed => Acquired::Completed(entry.response.clone()),
            },
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        status: EntryStatus::InProgress,
                        response: None,
                        created_at: now,
                    },
                );
                Acquired::New
            }
        }
    }

    /// Record the operation's response for duplicate callers.
    pub fn complete(&self, key: &str, response: serde_json::Value) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.status = EntryStatus::Completed;
            entry.response = Some(response);
        }
    }

    /// Release a failed operation's key so it can be retried.
    pub fn fail(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acquire_is_new() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        assert!(matches!(store.acquire("k"), Acquired::New));
        assert!(matches!(store.acquire("k"), Acquired::InProgress));
    }

    #[test]
    fn completed_keys_replay_response() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        store.acquire("k");
        store.complete("k", serde_json::json!({"cancelled": true}));
        match store.acquire("k") {
            Acquired::Completed(Some(resp)) => assert_eq!(resp["cancelled"], true),
            _ => panic!("expected cached response"),
        }
    }

    #[test]
    fn failed_keys_are_retryable() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        store.acquire("k");
        store.fail("k");
        assert!(matches!(store.acquire("k"), Acquired::New));
    }

    #[test]
    fn expired_keys_are_reaped() {
        let store = IdempotencyStore::new(Duration::from_millis(0));
        store.acquire("k");
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(store.acquire("k"), Acquired::New));
    }
}
