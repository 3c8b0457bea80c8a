//! Paper store: metadata rows plus the per-paper ingest claim lock.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use quill_domain::error::Result;
use quill_domain::paper::PaperMeta;

use crate::db::{now_rfc3339, Db};

#[derive(Debug, Clone, Serialize)]
pub struct PaperRecord {
    pub id: i64,
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub published_date: Option<String>,
    pub pdf_url: String,
    pub references: Vec<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct PaperStore {
    db: Db,
}

impl PaperStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert or update a paper row; returns its row id.
    pub async fn upsert(
        &self,
        meta: &PaperMeta,
        references: &[String],
        user_id: &str,
    ) -> Result<i64> {
        let meta = meta.clone();
        let references = references.to_vec();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                conn.execute(
                    "INSERT INTO papers (arxiv_id, user_id, title, authors, abstract,
                                         categories, published_date, pdf_url, refs, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(arxiv_id, user_id) DO UPDATE SET
                        title = excluded.title,
                        authors = excluded.authors,
                        abstract = excluded.abstract,
                        categories = excluded.categories,
                        published_date = excluded.published_date,
                        pdf_url = excluded.pdf_url,
                        refs = excluded.refs",
                    params![
                        meta.arxiv_id,
                        user_id,
                        meta.title,
                        json(&meta.authors),
                        meta.abstract_text,
                        json(&meta.categories),
                        meta.published_date,
                        meta.pdf_url,
                        json(&references),
                        now_rfc3339(),
                    ],
                )?;
                conn.query_row(
                    "SELECT id FROM papers WHERE arxiv_id = ?1 AND user_id = ?2",
                    params![meta.arxiv_id, user_id],
                    |row| row.get(0),
                )
            })
            .await
    }

    pub async fn get_by_arxiv_id(
        &self,
        arxiv_id: &str,
        user_id: &str,
    ) -> Result<Option<PaperRecord>> {
        let arxiv_id = arxiv_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                conn.query_row(
                    "SELECT id, arxiv_id, title, authors, abstract, categories,
                            published_date, pdf_url, refs, created_at
                     FROM papers WHERE arxiv_id = ?1 AND user_id = ?2",
                    params![arxiv_id, user_id],
                    paper_from_row,
                )
                .optional()
            })
            .await
    }

    /// Which of the given IDs already exist for this user.
    pub async fn existing_arxiv_ids(
        &self,
        arxiv_ids: &[String],
        user_id: &str,
    ) -> Result<HashSet<String>> {
        if arxiv_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let arxiv_ids = arxiv_ids.to_vec();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let placeholders = vec!["?"; arxiv_ids.len()].join(",");
                let sql = format!(
                    "SELECT arxiv_id FROM papers WHERE user_id = ? AND arxiv_id IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut sql_params: Vec<&dyn rusqlite::ToSql> = vec![&user_id];
                for id in &arxiv_ids {
                    sql_params.push(id);
                }
                let found = stmt
                    .query_map(sql_params.as_slice(), |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<HashSet<_>>>()?;
                Ok(found)
            })
            .await
    }

    /// Paginated listing, newest first. Returns `(papers, total)`.
    pub async fn list(
        &self,
        offset: usize,
        limit: usize,
        user_id: &str,
    ) -> Result<(Vec<PaperRecord>, usize)> {
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT count(*) FROM papers WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(
                    "SELECT id, arxiv_id, title, authors, abstract, categories,
                            published_date, pdf_url, refs, created_at
                     FROM papers WHERE user_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2 OFFSET ?3",
                )?;
                let papers = stmt
                    .query_map(params![user_id, limit as i64, offset as i64], paper_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok((papers, total as usize))
            })
            .await
    }

    // ── Ingest claim lock ──────────────────────────────────────────

    /// Claim a paper for ingestion. Returns `false` when another task
    /// already holds the claim; the caller skips the paper silently.
    pub async fn try_claim(&self, arxiv_id: &str, user_id: &str) -> Result<bool> {
        let arxiv_id = arxiv_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO ingest_claims (arxiv_id, user_id, claimed_at)
                     VALUES (?1, ?2, ?3)",
                    params![arxiv_id, user_id, now_rfc3339()],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    pub async fn release_claim(&self, arxiv_id: &str, user_id: &str) -> Result<()> {
        let arxiv_id = arxiv_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                conn.execute(
                    "DELETE FROM ingest_claims WHERE arxiv_id = ?1 AND user_id = ?2",
                    params![arxiv_id, user_id],
                )?;
                Ok(())
            })
            .await
    }
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".into())
}

fn list_col(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn paper_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaperRecord> {
    Ok(PaperRecord {
        id: row.get(0)?,
        arxiv_id: row.get(1)?,
        title: row.get(2)?,
        authors: list_col(row.get(3)?),
        abstract_text: row.get(4)?,
        categories: list_col(row.get(5)?),
        published_date: row.get(6)?,
        pdf_url: row.get(7)?,
        references: list_col(row.get(8)?),
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "11111111-1111-1111-1111-111111111111";

    fn meta(arxiv_id: &str) -> PaperMeta {
        PaperMeta {
            arxiv_id: arxiv_id.into(),
            title: format!("Paper {arxiv_id}"),
            authors: vec!["A. Author".into()],
            abstract_text: "An abstract.".into(),
            categories: vec!["cs.LG".into()],
            published_date: Some("2024-01-01".into()),
            pdf_url: PaperMeta::default_pdf_url(arxiv_id),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let store = PaperStore::new(Db::in_memory().unwrap());
        let id = store.upsert(&meta("2401.00001"), &["Ref 1".into()], USER).await.unwrap();
        assert!(id > 0);
        let rec = store.get_by_arxiv_id("2401.00001", USER).await.unwrap().unwrap();
        assert_eq!(rec.title, "Paper 2401.00001");
        assert_eq!(rec.references, vec!["Ref 1".to_string()]);
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row() {
        let store = PaperStore::new(Db::in_memory().unwrap());
        let id1 = store.upsert(&meta("2401.00001"), &[], USER).await.unwrap();
        let mut updated = meta("2401.00001");
        updated.title = "Updated".into();
        let id2 = store.upsert(&updated, &[], USER).await.unwrap();
        assert_eq!(id1, id2);
        let rec = store.get_by_arxiv_id("2401.00001", USER).await.unwrap().unwrap();
        assert_eq!(rec.title, "Updated");
    }

    #[tokio::test]
    async fn existing_ids_filters_correctly() {
        let store = PaperStore::new(Db::in_memory().unwrap());
        store.upsert(&meta("2401.00001"), &[], USER).await.unwrap();
        let existing = store
            .existing_arxiv_ids(&["2401.00001".into(), "2401.00002".into()], USER)
            .await
            .unwrap();
        assert!(existing.contains("2401.00001"));
        assert!(!existing.contains("2401.00002"));
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let store = PaperStore::new(Db::in_memory().unwrap());
        assert!(store.try_claim("2401.00001", USER).await.unwrap());
        assert!(!store.try_claim("2401.00001", USER).await.unwrap());
        store.release_claim("2401.00001", USER).await.unwrap();
        assert!(store.try_claim("2401.00001", USER).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_scoped_by_user() {
        let store = PaperStore::new(Db::in_memory().unwrap());
        store.upsert(&meta("2401.00001"), &[], USER).await.unwrap();
        let (papers, total) = store.list(0, 10, "other-user").await.unwrap();
        assert!(papers.is_empty());
        assert_eq!(total, 0);
    }
}
