//! The ingestion service.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use quill_domain::error::{Error, Result};
use quill_domain::paper::{IngestReport, PaperError, PaperMeta, PaperResult};
use quill_papers::{Chunker, PdfParser, RegistryClient, SearchParams};
use quill_providers::Embedder;
use quill_store::chunk::NewChunk;
use quill_store::{ChunkStore, PaperStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    pub query: String,
    #[serde(default = "d_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub force_reprocess: bool,
}

fn d_max_results() -> usize {
    5
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct IngestService {
    registry: Arc<RegistryClient>,
    parser: Arc<dyn PdfParser>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    papers: PaperStore,
    chunks: ChunkStore,
}

impl IngestService {
    pub fn new(
        registry: Arc<RegistryClient>,
        parser: Arc<dyn PdfParser>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        papers: PaperStore,
        chunks: ChunkStore,
    ) -> Self {
        Self {
            registry,
            parser,
            embedder,
            chunker,
            papers,
            chunks,
        }
    }

    /// Ingest papers found by a registry search.
    pub async fn ingest_papers(&self, request: &IngestRequest, user_id: &str) -> IngestReport {
        let start = Instant::now();
        tracing::info!(
            query = %request.query,
            max_results = request.max_results,
            force = request.force_reprocess,
            "ingest started"
        );

        let params = SearchParams {
            query: request.query.clone(),
            max_results: request.max_results,
            categories: request.categories.clone(),
            start_date: request.start_date.clone(),
            end_date: request.end_date.clone(),
        };
        let found = match self.registry.search_papers(&params).await {
            Ok(papers) => papers,
            Err(e) => {
                tracing::error!(error = %e, "ingest registry search failed");
                return IngestReport::failed(e.to_string());
            }
        };

        self.process_batch(found, request.force_reprocess, user_id, start)
            .await
    }

    /// Ingest specific papers by ID.
    pub async fn ingest_by_ids(
        &self,
        arxiv_ids: &[String],
        force_reprocess: bool,
        user_id: &str,
    ) -> IngestReport {
        let start = Instant::now();
        tracing::info!(ids = arxiv_ids.len(), "ingest by ids started");

        let found = match self.registry.get_papers_by_ids(arxiv_ids).await {
            Ok(papers) => papers,
            Err(e) => {
                tracing::error!(error = %e, "ingest metadata fetch failed");
                return IngestReport::failed(e.to_string());
            }
        };

        self.process_batch(found, force_reprocess, user_id, start).await
    }

    async fn process_batch(
        &self,
        found: Vec<PaperMeta>,
        force_reprocess: bool,
        user_id: &str,
        start: Instant,
    ) -> IngestReport {
        let papers_fetched = found.len();
        let mut papers_processed = 0;
        let mut chunks_created = 0;
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for meta in found {
            match self.process_single(&meta, force_reprocess, user_id).await {
                Ok(Some(result)) => {
                    papers_processed += 1;
                    chunks_created += result.chunks_created;
                    results.push(result);
                }
                Ok(None) => {} // skipped: already ingested or claim held
                Err(e) => {
                    tracing::warn!(arxiv_id = %meta.arxiv_id, error = %e, "paper processing failed");
                    errors.push(PaperError {
                        arxiv_id: meta.arxiv_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let duration = start.elapsed().as_secs_f64();
        tracing::info!(
            papers_fetched,
            papers_processed,
            chunks_created,
            errors = errors.len(),
            duration_s = format!("{duration:.2}"),
            "ingest complete"
        );

        IngestReport {
            status: "completed".into(),
            papers_fetched,
            papers_processed,
            chunks_created,
            duration_seconds: duration,
            papers: results,
            errors,
        }
    }

    /// Process one paper end to end. Returns `Ok(None)` when skipped
    /// (already ingested, or claimed by a concurrent ingestion).
    async fn process_single(
        &self,
        meta: &PaperMeta,
        force_reprocess: bool,
        user_id: &str,
    ) -> Result<Option<PaperResult>> {
        let arxiv_id = &meta.arxiv_id;

        let existing = self.papers.get_by_arxiv_id(arxiv_id, user_id).await?;
        if existing.is_some() && !force_reprocess {
            tracing::debug!(arxiv_id, "paper skipped (exists)");
            return Ok(None);
        }

        // Claim before any side effects. A held claim means another
        // task is mid-ingestion on this paper: skip silently.
        if !self.papers.try_claim(arxiv_id, user_id).await? {
            tracing::debug!(arxiv_id, "paper skipped (claim held)");
            return Ok(None);
        }

        let outcome = self.ingest_claimed(meta, user_id).await;
        self.papers.release_claim(arxiv_id, user_id).await?;
        outcome.map(Some)
    }

    async fn ingest_claimed(&self, meta: &PaperMeta, user_id: &str) -> Result<PaperResult> {
        let arxiv_id = &meta.arxiv_id;
        tracing::info!(arxiv_id, title = %truncate(&meta.title, 80), "processing paper");

        // Download and parse outside any store transaction.
        let temp_dir = tempfile::tempdir()?;
        let pdf_path = temp_dir.path().join(format!("{arxiv_id}.pdf"));
        self.registry.download_pdf(&meta.pdf_url, &pdf_path).await?;
        let parsed = self.parser.parse(&pdf_path, arxiv_id).await?;
        drop(temp_dir);

        let doc_chunks = self.chunker.chunk_document(&parsed.sections);
        if doc_chunks.is_empty() {
            return Err(Error::Other(format!(
                "no usable chunks extracted from {arxiv_id}"
            )));
        }

        let texts: Vec<String> = doc_chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let references = parsed.reference_lines();
        self.papers.upsert(meta, &references, user_id).await?;
        let record = self
            .papers
            .get_by_arxiv_id(arxiv_id, user_id)
            .await?
            .ok_or_else(|| Error::Store(format!("paper vanished after upsert: {arxiv_id}")))?;

        let new_chunks: Vec<NewChunk> = doc_chunks
            .iter()
            .map(|c| NewChunk {
                text: c.text.clone(),
                section_name: c.section_name.clone(),
                page_number: c.page_number,
            })
            .collect();
        let stored = self
            .chunks
            .replace_for_paper(&record, user_id, &new_chunks, &embeddings)
            .await?;

        tracing::info!(arxiv_id, chunks = stored, "paper ingested");
        Ok(PaperResult {
            arxiv_id: arxiv_id.clone(),
            title: meta.title.clone(),
            chunks_created: stored,
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
