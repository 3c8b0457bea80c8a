//! Paper, chunk, and ingestion wire types shared across crates.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Paper metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Metadata for a paper as returned by the external registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperMeta {
    pub arxiv_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    pub pdf_url: String,
}

impl PaperMeta {
    /// Canonical PDF URL for an arXiv ID when the registry omitted one.
    pub fn default_pdf_url(arxiv_id: &str) -> String {
        format!("https://arxiv.org/pdf/{arxiv_id}.pdf")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chunk
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A paragraph-sized slice of a paper with its retrieval metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub arxiv_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub chunk_text: String,
    #[serde(default)]
    pub section_name: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    /// Relevance score from the search backend, normalized in hybrid mode.
    #[serde(default)]
    pub score: f32,
    pub pdf_url: String,
    #[serde(default)]
    pub published_date: Option<String>,
}

/// A source attribution derived from a relevant chunk, as surfaced to
/// clients in `sources` events and persisted on turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub arxiv_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub pdf_url: String,
    pub relevance_score: f32,
    #[serde(default)]
    pub published_date: Option<String>,
    pub was_graded_relevant: bool,
}

impl From<&Chunk> for SourceInfo {
    fn from(c: &Chunk) -> Self {
        Self {
            arxiv_id: c.arxiv_id.clone(),
            title: c.title.clone(),
            authors: c.authors.clone(),
            pdf_url: c.pdf_url.clone(),
            relevance_score: c.score,
            published_date: c.published_date.clone(),
            was_graded_relevant: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ingestion report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperResult {
    pub arxiv_id: String,
    pub title: String,
    pub chunks_created: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperError {
    pub arxiv_id: String,
    pub error: String,
}

/// Summary of one ingestion run.
///
/// `status` is `"completed"` unless the registry search itself failed;
/// per-paper failures land in `errors` without failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub status: String,
    pub papers_fetched: usize,
    pub papers_processed: usize,
    pub chunks_created: usize,
    pub duration_seconds: f64,
    #[serde(default)]
    pub papers: Vec<PaperResult>,
    #[serde(default)]
    pub errors: Vec<PaperError>,
}

impl IngestReport {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: "failed".into(),
            papers_fetched: 0,
            papers_processed: 0,
            chunks_created: 0,
            duration_seconds: 0.0,
            papers: Vec::new(),
            errors: vec![PaperError {
                arxiv_id: "N/A".into(),
                error: error.into(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_info_from_chunk() {
        let chunk = Chunk {
            chunk_id: "c1".into(),
            arxiv_id: "2401.00001".into(),
            title: "Attention".into(),
            authors: vec!["A. Author".into()],
            chunk_text: "text".into(),
            section_name: Some("Introduction".into()),
            page_number: Some(1),
            score: 0.8,
            pdf_url: "https://arxiv.org/pdf/2401.00001.pdf".into(),
            published_date: Some("2024-01-01".into()),
        };
        let src = SourceInfo::from(&chunk);
        assert_eq!(src.arxiv_id, "2401.00001");
        assert!(src.was_graded_relevant);
        assert!((src.relevance_score - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn default_pdf_url_shape() {
        assert_eq!(
            PaperMeta::default_pdf_url("2401.12345"),
            "https://arxiv.org/pdf/2401.12345.pdf"
        );
    }
}
