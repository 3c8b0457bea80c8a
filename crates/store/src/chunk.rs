//! Chunk store backing both search modes.
//!
//! Embeddings are stored as little-endian `f32` BLOBs and scanned with
//! cosine similarity for vector search; the FTS5 mirror serves lexical
//! search ranked by BM25.

use rusqlite::params;

use quill_domain::error::{Error, Result};
use quill_domain::paper::Chunk;

use crate::db::{now_rfc3339, Db};
use crate::paper::PaperRecord;

/// One chunk to insert, paired with its embedding by index.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub section_name: Option<String>,
    pub page_number: Option<u32>,
}

#[derive(Clone)]
pub struct ChunkStore {
    db: Db,
}

impl ChunkStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Replace all chunks for a paper in one transaction.
    pub async fn replace_for_paper(
        &self,
        paper: &PaperRecord,
        user_id: &str,
        chunks: &[NewChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Store(format!(
                "chunk/embedding count mismatch: {} vs {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        let paper_id = paper.id;
        let arxiv_id = paper.arxiv_id.clone();
        let user_id = user_id.to_string();
        let chunks = chunks.to_vec();
        let embeddings = embeddings.to_vec();
        self.db
            .with(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM chunks WHERE paper_id = ?1",
                    params![paper_id],
                )?;
                let now = now_rfc3339();
                for (idx, (chunk, embedding)) in chunks.iter().zip(&embeddings).enumerate() {
                    tx.execute(
                        "INSERT INTO chunks (chunk_id, paper_id, user_id, chunk_index,
                                             chunk_text, section_name, page_number,
                                             embedding, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            format!("{arxiv_id}:{idx}"),
                            paper_id,
                            user_id,
                            idx as i64,
                            chunk.text,
                            chunk.section_name,
                            chunk.page_number,
                            encode_embedding(embedding),
                            now,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(chunks.len())
            })
            .await
    }

    pub async fn count(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT count(*) FROM chunks WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(n as usize)
            })
            .await
    }

    /// Brute-force cosine scan over the user's chunks. Returns up to
    /// `top_k` chunks above `min_score`, best first.
    pub async fn vector_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_score: Option<f32>,
        user_id: &str,
    ) -> Result<Vec<Chunk>> {
        let query = query_embedding.to_vec();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.chunk_id, c.chunk_text, c.section_name, c.page_number,
                            c.embedding, p.arxiv_id, p.title, p.authors, p.pdf_url,
                            p.published_date
                     FROM chunks c JOIN papers p ON p.id = c.paper_id
                     WHERE c.user_id = ?1",
                )?;
                let mut scored: Vec<Chunk> = stmt
                    .query_map(params![user_id], |row| {
                        let blob: Vec<u8> = row.get(4)?;
                        let mut chunk = chunk_from_row(row)?;
                        chunk.score = cosine_similarity(&query, &decode_embedding(&blob));
                        Ok(chunk)
                    })?
                    .collect::<rusqlite::Result<_>>()?;

                if let Some(min) = min_score {
                    scored.retain(|c| c.score >= min);
                }
                scored.sort_by(|a, b| b.score.total_cmp(&a.score));
                scored.truncate(top_k);
                Ok(scored)
            })
            .await
    }

    /// FTS5 lexical search ranked by BM25. `match_query` must already
    /// be a sanitized conjunctive expression.
    pub async fn fulltext_search(
        &self,
        match_query: &str,
        top_k: usize,
        user_id: &str,
    ) -> Result<Vec<Chunk>> {
        if match_query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let match_query = match_query.to_string();
        let user_id = user_id.to_string();
        self.db
            .with(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.chunk_id, c.chunk_text, c.section_name, c.page_number,
                            bm25(chunks_fts), p.arxiv_id, p.title, p.authors, p.pdf_url,
                            p.published_date
                     FROM chunks_fts
                     JOIN chunks c ON c.id = chunks_fts.rowid
                     JOIN papers p ON p.id = c.paper_id
                     WHERE chunks_fts MATCH ?1 AND c.user_id = ?2
                     ORDER BY bm25(chunks_fts)
                     LIMIT ?3",
                )?;
                let chunks = stmt
                    .query_map(params![match_query, user_id, top_k as i64], |row| {
                        let rank: f64 = row.get(4)?;
                        let mut chunk = chunk_from_row(row)?;
                        // BM25 rank is lower-is-better (and negative in
                        // SQLite); fold into a positive score.
                        chunk.score = (1.0 / (1.0 + rank.abs())) as f32;
                        Ok(chunk)
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(chunks)
            })
            .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Embedding codec and similarity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn encode_embedding(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for f in v {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

pub(crate) fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; zero-magnitude or mismatched-length
/// inputs yield `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            len_a = a.len(),
            len_b = b.len(),
            "cosine_similarity: mismatched vector lengths, returning 0.0"
        );
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Shared column layout: chunk fields, a score placeholder at index 4,
/// then paper metadata.
fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let authors: String = row.get(7)?;
    Ok(Chunk {
        chunk_id: row.get(0)?,
        chunk_text: row.get(1)?,
        section_name: row.get(2)?,
        page_number: row.get(3)?,
        score: 0.0,
        arxiv_id: row.get(5)?,
        title: row.get(6)?,
        authors: serde_json::from_str(&authors).unwrap_or_default(),
        pdf_url: row.get(8)?,
        published_date: row.get(9)?,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
