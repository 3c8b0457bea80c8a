//! Append-only conversation store.
//!
//! Turn numbers are monotone and contiguous per session: `save_turn`
//! computes the next number inside a `BEGIN IMMEDIATE` transaction and
//! tolerates lock/constraint races with up to three retries. At most
//! one turn per session carries a pending HITL confirmation.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use quill_domain::error::Result;
use quill_domain::paper::SourceInfo;
use quill_domain::stream::ProposalPaper;

use crate::db::{is_retryable, now_rfc3339, store_err, Db};

const SAVE_TURN_RETRIES: usize = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HITL snapshot stored on the paused turn; sufficient to resume the
/// interrupted run on a later request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub papers: Vec<ProposalPaper>,
    pub proposed_ids: Vec<String>,
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    /// Keys the orchestrator checkpoint for this interrupted run.
    pub thread_id: String,
}

/// Payload for inserting a new turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnData {
    pub user_query: String,
    pub agent_response: String,
    pub provider: String,
    pub model: String,
    pub guardrail_score: Option<u8>,
    pub retrieval_attempts: u32,
    pub rewritten_query: Option<String>,
    pub sources: Option<Vec<SourceInfo>>,
    pub reasoning_steps: Option<Vec<String>>,
    pub thinking_steps: Option<serde_json::Value>,
    pub citations: Option<serde_json::Value>,
    pub pending_confirmation: Option<PendingConfirmation>,
}

/// A stored turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_number: i64,
    pub user_query: String,
    pub agent_response: String,
    pub provider: String,
    pub model: String,
    pub guardrail_score: Option<u8>,
    pub retrieval_attempts: u32,
    pub rewritten_query: Option<String>,
    pub sources: Option<Vec<SourceInfo>>,
    pub reasoning_steps: Option<Vec<String>>,
    pub thinking_steps: Option<serde_json::Value>,
    pub citations: Option<serde_json::Value>,
    pub pending_confirmation: Option<PendingConfirmation>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub id: i64,
    pub session_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing item for `GET /conversations`.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub session_id: String,
    pub title: Option<String>,
    pub turn_count: i64,
    pub created_at: String,
    pub updated_at: String,
    /// First 100 chars of the most recent user query.
    pub last_query: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct ConversationStore {
    db: Db,
}

impl ConversationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Get the conversation for `session_id`, creating it when absent.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<ConversationRecord> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                if let Some(rec) = find_conversation(conn, &session_id, &user_id)? {
                    return Ok(rec);
                }
                let now = now_rfc3339();
                conn.execute(
                    "INSERT INTO conversations (session_id, user_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)",
                    params![session_id, user_id, now],
                )?;
                tracing::debug!(session_id = %session_id, "conversation created");
                find_conversation(conn, &session_id, &user_id)?.ok_or_else(|| {
                    rusqlite::Error::QueryReturnedNoRows
                })
            })
            .await
    }

    /// Up to `limit` most-recent turns, returned in chronological order.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: usize,
        user_id: &str,
    ) -> Result<Vec<TurnRecord>> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let Some(conv) = find_conversation(conn, &session_id, &user_id)? else {
                    return Ok(Vec::new());
                };
                let mut stmt = conn.prepare(
                    "SELECT * FROM conversation_turns
                     WHERE conversation_id = ?1
                     ORDER BY turn_number DESC LIMIT ?2",
                )?;
                let mut turns: Vec<TurnRecord> = stmt
                    .query_map(params![conv.id, limit as i64], turn_from_row)?
                    .collect::<rusqlite::Result<_>>()?;
                turns.reverse();
                Ok(turns)
            })
            .await
    }

    /// Append a turn, computing the next contiguous turn number
    /// atomically. Must run inside its own transaction; races surface
    /// as busy/constraint errors and are retried up to three times.
    pub async fn save_turn(
        &self,
        session_id: &str,
        turn: TurnData,
        user_id: &str,
    ) -> Result<TurnRecord> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let mut last_err = None;
                for attempt in 0..SAVE_TURN_RETRIES {
                    match insert_turn_txn(conn, &session_id, &turn, &user_id) {
                        Ok(rec) => return Ok(rec),
                        Err(e) if is_retryable(&e) && attempt + 1 < SAVE_TURN_RETRIES => {
                            tracing::warn!(
                                session_id = %session_id,
                                attempt = attempt + 1,
                                error = %e,
                                "turn save retry"
                            );
                            last_err = Some(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(last_err.unwrap_or(rusqlite::Error::QueryReturnedNoRows))
            })
            .await
    }

    /// Fill in the answer on a previously paused turn and clear its
    /// pending confirmation. Optional fields are left untouched when
    /// not supplied.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_pending_turn(
        &self,
        session_id: &str,
        turn_number: i64,
        agent_response: &str,
        thinking_steps: Option<serde_json::Value>,
        sources: Option<Vec<SourceInfo>>,
        reasoning_steps: Option<Vec<String>>,
        citations: Option<serde_json::Value>,
        user_id: &str,
    ) -> Result<Option<TurnRecord>> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        let agent_response = agent_response.to_string();
        self.db
            .with(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let Some(conv) = find_conversation(&tx, &session_id, &user_id)? else {
                    return Ok(None);
                };

                tx.execute(
                    "UPDATE conversation_turns
                     SET agent_response = ?1, pending_confirmation = NULL
                     WHERE conversation_id = ?2 AND turn_number = ?3",
                    params![agent_response, conv.id, turn_number],
                )?;
                if let Some(v) = &thinking_steps {
                    tx.execute(
                        "UPDATE conversation_turns SET thinking_steps = ?1
                         WHERE conversation_id = ?2 AND turn_number = ?3",
                        params![v.to_string(), conv.id, turn_number],
                    )?;
                }
                if let Some(v) = &sources {
                    tx.execute(
                        "UPDATE conversation_turns SET sources = ?1
                         WHERE conversation_id = ?2 AND turn_number = ?3",
                        params![to_json(v), conv.id, turn_number],
                    )?;
                }
                if let Some(v) = &reasoning_steps {
                    tx.execute(
                        "UPDATE conversation_turns SET reasoning_steps = ?1
                         WHERE conversation_id = ?2 AND turn_number = ?3",
                        params![to_json(v), conv.id, turn_number],
                    )?;
                }
                if let Some(v) = &citations {
                    tx.execute(
                        "UPDATE conversation_turns SET citations = ?1
                         WHERE conversation_id = ?2 AND turn_number = ?3",
                        params![v.to_string(), conv.id, turn_number],
                    )?;
                }

                let rec = tx
                    .query_row(
                        "SELECT * FROM conversation_turns
                         WHERE conversation_id = ?1 AND turn_number = ?2",
                        params![conv.id, turn_number],
                        turn_from_row,
                    )
                    .optional()?;
                tx.commit()?;
                tracing::debug!(session_id = %session_id, turn_number, "pending turn completed");
                Ok(rec)
            })
            .await
    }

    pub async fn has_pending_confirmation(&self, session_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.get_pending_turn(session_id, user_id).await?.is_some())
    }

    /// Latest turn with a non-null pending confirmation, if any.
    pub async fn get_pending_turn(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<TurnRecord>> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let Some(conv) = find_conversation(conn, &session_id, &user_id)? else {
                    return Ok(None);
                };
                conn.query_row(
                    "SELECT * FROM conversation_turns
                     WHERE conversation_id = ?1 AND pending_confirmation IS NOT NULL
                     ORDER BY turn_number DESC LIMIT 1",
                    params![conv.id],
                    turn_from_row,
                )
                .optional()
            })
            .await
    }

    /// Clear the pending confirmation without touching other fields.
    pub async fn clear_pending_confirmation(
        &self,
        session_id: &str,
        turn_number: i64,
        user_id: &str,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if let Some(conv) = find_conversation(&tx, &session_id, &user_id)? {
                    tx.execute(
                        "UPDATE conversation_turns SET pending_confirmation = NULL
                         WHERE conversation_id = ?1 AND turn_number = ?2",
                        params![conv.id, turn_number],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    pub async fn update_title(&self, session_id: &str, title: &str, user_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        let title = title.to_string();
        self.db
            .with(move |conn| {
                conn.execute(
                    "UPDATE conversations SET title = ?1, updated_at = ?2
                     WHERE session_id = ?3 AND user_id = ?4",
                    params![title, now_rfc3339(), session_id, user_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Delete a conversation and cascade its turns. Returns the number
    /// of turns deleted, or `None` when not found / not owned.
    pub async fn delete(&self, session_id: &str, user_id: &str) -> Result<Option<usize>> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let Some(conv) = find_conversation(&tx, &session_id, &user_id)? else {
                    return Ok(None);
                };
                let turns: i64 = tx.query_row(
                    "SELECT count(*) FROM conversation_turns WHERE conversation_id = ?1",
                    params![conv.id],
                    |row| row.get(0),
                )?;
                tx.execute("DELETE FROM conversations WHERE id = ?1", params![conv.id])?;
                tx.commit()?;
                tracing::info!(session_id = %session_id, turns, "conversation deleted");
                Ok(Some(turns as usize))
            })
            .await
    }

    /// Paginated listing owned by `user_id`, most recently updated
    /// first. Returns `(items, total)`.
    pub async fn list(
        &self,
        offset: usize,
        limit: usize,
        user_id: &str,
    ) -> Result<(Vec<ConversationSummary>, usize)> {
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT count(*) FROM conversations WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    "SELECT c.session_id, c.title, c.created_at, c.updated_at,
                            (SELECT count(*) FROM conversation_turns t WHERE t.conversation_id = c.id),
                            (SELECT t.user_query FROM conversation_turns t
                             WHERE t.conversation_id = c.id
                             ORDER BY t.turn_number DESC LIMIT 1)
                     FROM conversations c
                     WHERE c.user_id = ?1
                     ORDER BY c.updated_at DESC
                     LIMIT ?2 OFFSET ?3",
                )?;
                let items = stmt
                    .query_map(params![user_id, limit as i64, offset as i64], |row| {
                        let last_query: Option<String> = row.get(5)?;
                        Ok(ConversationSummary {
                            session_id: row.get(0)?,
                            title: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                            turn_count: row.get(4)?,
                            last_query: last_query.map(|q| q.chars().take(100).collect()),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok((items, total as usize))
            })
            .await
    }

    /// Full conversation with all turns in order.
    pub async fn get_with_turns(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<(ConversationRecord, Vec<TurnRecord>)>> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let Some(conv) = find_conversation(conn, &session_id, &user_id)? else {
                    return Ok(None);
                };
                let mut stmt = conn.prepare(
                    "SELECT * FROM conversation_turns
                     WHERE conversation_id = ?1 ORDER BY turn_number ASC",
                )?;
                let turns = stmt
                    .query_map(params![conv.id], turn_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(Some((conv, turns)))
            })
            .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn find_conversation(
    conn: &Connection,
    session_id: &str,
    user_id: &str,
) -> rusqlite::Result<Option<ConversationRecord>> {
    conn.query_row(
        "SELECT id, session_id, user_id, title, created_at, updated_at
         FROM conversations WHERE session_id = ?1 AND user_id = ?2",
        params![session_id, user_id],
        |row| {
            Ok(ConversationRecord {
                id: row.get(0)?,
                session_id: row.get(1)?,
                user_id: row.get(2)?,
                title: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()
}

/// One attempt at the insert transaction. Locks the conversation row
/// set for writing (`BEGIN IMMEDIATE`), computes the next turn number,
/// inserts, and bumps `updated_at`.
fn insert_turn_txn(
    conn: &mut Connection,
    session_id: &str,
    turn: &TurnData,
    user_id: &str,
) -> rusqlite::Result<TurnRecord> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = now_rfc3339();

    let conv_id: i64 = match find_conversation(&tx, session_id, user_id)? {
        Some(conv) => conv.id,
        None => {
            tx.execute(
                "INSERT INTO conversations (session_id, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![session_id, user_id, now],
            )?;
            tx.last_insert_rowid()
        }
    };

    let max_turn: Option<i64> = tx
        .query_row(
            "SELECT max(turn_number) FROM conversation_turns WHERE conversation_id = ?1",
            params![conv_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let turn_number = max_turn.map_or(0, |n| n + 1);

    tx.execute(
        "INSERT INTO conversation_turns (
            conversation_id, turn_number, user_query, agent_response, provider, model,
            guardrail_score, retrieval_attempts, rewritten_query, sources,
            reasoning_steps, thinking_steps, citations, pending_confirmation, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            conv_id,
            turn_number,
            turn.user_query,
            turn.agent_response,
            turn.provider,
            turn.model,
            turn.guardrail_score,
            turn.retrieval_attempts,
            turn.rewritten_query,
            turn.sources.as_ref().map(to_json),
            turn.reasoning_steps.as_ref().map(to_json),
            turn.thinking_steps.as_ref().map(|v| v.to_string()),
            turn.citations.as_ref().map(|v| v.to_string()),
            turn.pending_confirmation.as_ref().map(to_json),
            now,
        ],
    )?;

    tx.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![now, conv_id],
    )?;

    let rec = tx.query_row(
        "SELECT * FROM conversation_turns WHERE conversation_id = ?1 AND turn_number = ?2",
        params![conv_id, turn_number],
        turn_from_row,
    )?;
    tx.commit()?;

    tracing::debug!(session_id, turn_number, "turn saved");
    Ok(rec)
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

fn from_json_col<T: for<'de> Deserialize<'de>>(raw: Option<String>) -> Option<T> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn turn_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TurnRecord> {
    // Columns by name so `SELECT *` stays robust against column order.
    Ok(TurnRecord {
        turn_number: row.get("turn_number")?,
        user_query: row.get("user_query")?,
        agent_response: row.get("agent_response")?,
        provider: row.get("provider")?,
        model: row.get("model")?,
        guardrail_score: row.get("guardrail_score")?,
        retrieval_attempts: row.get("retrieval_attempts")?,
        rewritten_query: row.get("rewritten_query")?,
        sources: from_json_col(row.get("sources")?),
        reasoning_steps: from_json_col(row.get("reasoning_steps")?),
        thinking_steps: from_json_col(row.get("thinking_steps")?),
        citations: from_json_col(row.get("citations")?),
        pending_confirmation: from_json_col(row.get("pending_confirmation")?),
        created_at: row.get("created_at")?,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "11111111-1111-1111-1111-111111111111";
    const OTHER: &str = "22222222-2222-2222-2222-222222222222";

    fn store() -> ConversationStore {
        ConversationStore::new(Db::in_memory().unwrap())
    }

    fn turn(query: &str) -> TurnData {
        TurnData {
            user_query: query.into(),
            agent_response: format!("answer to {query}"),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            ..Default::default()
        }
    }

    fn pending(thread_id: &str) -> PendingConfirmation {
        PendingConfirmation {
            papers: vec![],
            proposed_ids: vec!["2401.00001".into()],
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.3,
            thread_id: thread_id.into(),
        }
    }

    #[tokio::test]
    async fn turn_numbers_are_contiguous_from_zero() {
        let store = store();
        for i in 0..5 {
            let rec = store.save_turn("s1", turn(&format!("q{i}")), USER).await.unwrap();
            assert_eq!(rec.turn_number, i);
        }
        let history = store.get_history("s1", 10, USER).await.unwrap();
        let numbers: Vec<i64> = history.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn history_is_chronological_and_bounded() {
        let store = store();
        for i in 0..6 {
            store.save_turn("s1", turn(&format!("q{i}")), USER).await.unwrap();
        }
        let history = store.get_history("s1", 3, USER).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].user_query, "q3");
        assert_eq!(history[2].user_query, "q5");
    }

    #[tokio::test]
    async fn cross_user_reads_are_empty() {
        let store = store();
        store.save_turn("s1", turn("q"), USER).await.unwrap();
        assert!(store.get_history("s1", 10, OTHER).await.unwrap().is_empty());
        assert!(store.get_with_turns("s1", OTHER).await.unwrap().is_none());
        assert!(store.delete("s1", OTHER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_turns() {
        let store = store();
        store.save_turn("s1", turn("a"), USER).await.unwrap();
        store.save_turn("s1", turn("b"), USER).await.unwrap();
        let deleted = store.delete("s1", USER).await.unwrap();
        assert_eq!(deleted, Some(2));
        assert!(store.get_with_turns("s1", USER).await.unwrap().is_none());
        assert!(store.get_history("s1", 10, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_confirmation_round_trip() {
        let store = store();
        let mut data = turn("find papers");
        data.agent_response = String::new();
        data.pending_confirmation = Some(pending("t-1"));
        let rec = store.save_turn("s1", data, USER).await.unwrap();
        assert_eq!(rec.turn_number, 0);

        assert!(store.has_pending_confirmation("s1", USER).await.unwrap());
        let pending_turn = store.get_pending_turn("s1", USER).await.unwrap().unwrap();
        assert_eq!(
            pending_turn.pending_confirmation.as_ref().unwrap().thread_id,
            "t-1"
        );

        let completed = store
            .complete_pending_turn("s1", 0, "done", None, None, None, None, USER)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.agent_response, "done");
        assert!(completed.pending_confirmation.is_none());
        assert!(!store.has_pending_confirmation("s1", USER).await.unwrap());
    }

    #[tokio::test]
    async fn clear_pending_leaves_response_untouched() {
        let store = store();
        let mut data = turn("find papers");
        data.pending_confirmation = Some(pending("t-2"));
        store.save_turn("s1", data, USER).await.unwrap();

        store.clear_pending_confirmation("s1", 0, USER).await.unwrap();
        let (_, turns) = store.get_with_turns("s1", USER).await.unwrap().unwrap();
        assert!(turns[0].pending_confirmation.is_none());
        assert_eq!(turns[0].agent_response, "answer to find papers");
    }

    #[tokio::test]
    async fn complete_pending_on_missing_session_returns_none() {
        let store = store();
        let result = store
            .complete_pending_turn("ghost", 0, "x", None, None, None, None, USER)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn list_orders_by_updated_and_previews_last_query() {
        let store = store();
        store.save_turn("s1", turn("first session question"), USER).await.unwrap();
        store.save_turn("s2", turn("second session question"), USER).await.unwrap();
        store.save_turn("s1", turn("follow-up"), USER).await.unwrap();

        let (items, total) = store.list(0, 10, USER).await.unwrap();
        assert_eq!(total, 2);
        // s1 was updated last (by the follow-up) but same-timestamp rows
        // may tie; just verify both sessions are present with counts.
        let s1 = items.iter().find(|i| i.session_id == "s1").unwrap();
        assert_eq!(s1.turn_count, 2);
        assert_eq!(s1.last_query.as_deref(), Some("follow-up"));
    }

    #[tokio::test]
    async fn sources_and_reasoning_round_trip() {
        let store = store();
        let mut data = turn("q");
        data.sources = Some(vec![SourceInfo {
            arxiv_id: "2401.00001".into(),
            title: "T".into(),
            authors: vec![],
            pdf_url: "u".into(),
            relevance_score: 1.0,
            published_date: None,
            was_graded_relevant: true,
        }]);
        data.reasoning_steps = Some(vec!["step".into()]);
        store.save_turn("s1", data, USER).await.unwrap();

        let (_, turns) = store.get_with_turns("s1", USER).await.unwrap().unwrap();
        assert_eq!(turns[0].sources.as_ref().unwrap().len(), 1);
        assert_eq!(turns[0].reasoning_steps.as_ref().unwrap()[0], "step");
    }

    #[tokio::test]
    async fn update_title_persists() {
        let store = store();
        store.save_turn("s1", turn("q"), USER).await.unwrap();
        store.update_title("s1", "Attention chat", USER).await.unwrap();
        let (conv, _) = store.get_with_turns("s1", USER).await.unwrap().unwrap();
        assert_eq!(conv.title.as_deref(), Some("Attention chat"));
    }
}
