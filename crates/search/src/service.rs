//! The search service: vector, lexical, and RRF-fused hybrid modes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use quill_domain::config::SearchConfig;
use quill_domain::error::Result;
use quill_domain::paper::Chunk;
use quill_providers::Embedder;
use quill_store::ChunkStore;

use crate::rrf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Fulltext,
    #[default]
    Hybrid,
}

pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    chunks: ChunkStore,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(embedder: Arc<dyn Embedder>, chunks: ChunkStore, config: SearchConfig) -> Self {
        Self {
            embedder,
            chunks,
            config,
        }
    }

    /// Run a search in the requested mode. Hybrid over-fetches both
    /// backends by the configured multiplier, fuses with RRF, and
    /// normalizes scores so the top result is `1.0`.
    pub async fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        mode: SearchMode,
        min_score: Option<f32>,
        user_id: &str,
    ) -> Result<Vec<Chunk>> {
        let min_score = min_score.or(self.config.min_score);
        tracing::debug!(query = %truncate(query, 100), top_k, ?mode, "search started");

        let results = match mode {
            SearchMode::Vector => self.vector(query, top_k, min_score, user_id).await?,
            SearchMode::Fulltext => self.fulltext(query, top_k, user_id).await?,
            SearchMode::Hybrid => {
                let fetch_k = top_k * self.config.fetch_multiplier.max(1);
                let (vector, lexical) = tokio::join!(
                    self.vector(query, fetch_k, min_score, user_id),
                    self.fulltext(query, fetch_k, user_id),
                );
                rrf::fuse(&[vector?, lexical?], self.config.k_rrf, top_k)
            }
        };

        tracing::debug!(found = results.len(), "search complete");
        Ok(results)
    }

    async fn vector(
        &self,
        query: &str,
        top_k: usize,
        min_score: Option<f32>,
        user_id: &str,
    ) -> Result<Vec<Chunk>> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_embedding) = embeddings.first() else {
            return Ok(Vec::new());
        };
        self.chunks
            .vector_search(query_embedding, top_k, min_score, user_id)
            .await
    }

    async fn fulltext(&self, query: &str, top_k: usize, user_id: &str) -> Result<Vec<Chunk>> {
        let match_query = prepare_match_query(query);
        if match_query.is_empty() {
            return Ok(Vec::new());
        }
        self.chunks.fulltext_search(&match_query, top_k, user_id).await
    }
}

/// Prepare a conjunctive lexical expression: alphanumeric tokens,
/// quoted and joined so every token must match.
pub fn prepare_match_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            tok.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|tok| !tok.is_empty())
        .map(|tok| format!("\"{tok}\""))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_domain::paper::PaperMeta;
    use quill_store::chunk::NewChunk;
    use quill_store::{Db, PaperStore};

    const USER: &str = "11111111-1111-1111-1111-111111111111";

    /// Deterministic embedder: texts about "attention" map near one
    /// axis, everything else near the other.
    struct KeywordEmbedder;

    #[async_trait::async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("attention") {
                        vec![1.0, 0.1]
                    } else {
                        vec![0.1, 1.0]
                    }
                })
                .collect())
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    async fn seeded_service() -> SearchService {
        let db = Db::in_memory().unwrap();
        let papers = PaperStore::new(db.clone());
        let chunks = ChunkStore::new(db);
        let meta = PaperMeta {
            arxiv_id: "2401.00001".into(),
            title: "Attention".into(),
            authors: vec![],
            abstract_text: String::new(),
            categories: vec![],
            published_date: None,
            pdf_url: PaperMeta::default_pdf_url("2401.00001"),
        };
        papers.upsert(&meta, &[], USER).await.unwrap();
        let paper = papers.get_by_arxiv_id("2401.00001", USER).await.unwrap().unwrap();

        let texts = [
            "multi head attention mechanism in transformers",
            "attention weights are computed with softmax",
            "relational databases store rows in pages",
        ];
        let new_chunks: Vec<NewChunk> = texts
            .iter()
            .map(|t| NewChunk {
                text: t.to_string(),
                section_name: None,
                page_number: None,
            })
            .collect();
        let embedder = KeywordEmbedder;
        let embeddings = embedder
            .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        chunks
            .replace_for_paper(&paper, USER, &new_chunks, &embeddings)
            .await
            .unwrap();

        SearchService::new(Arc::new(KeywordEmbedder), chunks, SearchConfig::default())
    }

    #[test]
    fn match_query_is_conjunctive_and_sanitized() {
        assert_eq!(
            prepare_match_query("multi-head attention!"),
            "\"multihead\" AND \"attention\""
        );
        assert_eq!(prepare_match_query("   "), "");
    }

    #[tokio::test]
    async fn hybrid_top_score_is_one() {
        let service = seeded_service().await;
        let results = service
            .hybrid_search("attention mechanism", 2, SearchMode::Hybrid, None, USER)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!((results[0].score - 1.0).abs() < 1e-6);
        for r in &results {
            assert!(r.score > 0.0 && r.score <= 1.0);
        }
    }

    #[tokio::test]
    async fn vector_mode_prefers_semantic_match() {
        let service = seeded_service().await;
        let results = service
            .hybrid_search("attention", 1, SearchMode::Vector, None, USER)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk_text.contains("attention"));
    }

    #[tokio::test]
    async fn fulltext_mode_requires_all_tokens() {
        let service = seeded_service().await;
        let results = service
            .hybrid_search("attention softmax", 5, SearchMode::Fulltext, None, USER)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk_text.contains("softmax"));
    }

    #[tokio::test]
    async fn empty_query_fulltext_is_empty() {
        let service = seeded_service().await;
        let results = service
            .hybrid_search("?!", 5, SearchMode::Fulltext, None, USER)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
