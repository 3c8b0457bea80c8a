//! Client for the external paper registry.
//!
//! The registry exposes a JSON search endpoint and serves paper PDFs.
//! Transient failures are retried with exponential backoff; HTTP 429
//! honours the server's `Retry-After` hint clamped to `[10s, 120s]`.
//! A fixed politeness delay separates successive registry calls.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;

use quill_domain::config::RegistryConfig;
use quill_domain::error::{Error, Result};
use quill_domain::paper::PaperMeta;
use quill_providers::util::{from_reqwest, retry_after_wait};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub max_results: usize,
    pub categories: Vec<String>,
    /// Inclusive lower bound, `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`.
    pub end_date: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RegistryClient {
    base_url: String,
    politeness_delay: Duration,
    max_retries: u32,
    client: reqwest::Client,
    /// Timestamp of the last registry call, for the politeness delay.
    last_call: Mutex<Option<Instant>>,
}

impl RegistryClient {
    pub fn from_config(cfg: &RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            politeness_delay: Duration::from_millis(cfg.politeness_delay_ms),
            max_retries: cfg.max_retries,
            client,
            last_call: Mutex::new(None),
        })
    }

    /// Sleep until the politeness delay since the previous call has
    /// elapsed, then stamp this call.
    async fn respect_rate_limit(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.politeness_delay {
                tokio::time::sleep(self.politeness_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Issue a GET with bounded retries. 429 waits out the clamped
    /// `Retry-After` hint; 5xx and transport errors back off
    /// exponentially starting at one second.
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            self.respect_rate_limit().await;
            let result = self.client.get(url).send().await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt >= self.max_retries {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Http(format!(
                            "registry HTTP {}: {}",
                            status.as_u16(),
                            body
                        )));
                    }
                    let wait = if status.as_u16() == 429 {
                        retry_after_wait(resp.headers())
                    } else {
                        Duration::from_secs(1 << attempt.min(4))
                    };
                    tracing::warn!(
                        url = %url,
                        status = status.as_u16(),
                        wait_s = wait.as_secs(),
                        attempt,
                        "registry request throttled, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(from_reqwest(e));
                    }
                    let wait = Duration::from_secs(1 << attempt.min(4));
                    tracing::warn!(url = %url, error = %e, attempt, "registry request failed, retrying");
                    tokio::time::sleep(wait).await;
                }
            }
            attempt += 1;
        }
    }

    /// Search the registry for papers matching the query.
    pub async fn search_papers(&self, params: &SearchParams) -> Result<Vec<PaperMeta>> {
        let mut url = format!(
            "{}/papers/search?query={}&limit={}",
            self.base_url,
            urlencode(&params.query),
            params.max_results.clamp(1, 50),
        );
        if !params.categories.is_empty() {
            url.push_str(&format!(
                "&categories={}",
                urlencode(&params.categories.join(","))
            ));
        }
        if let Some(start) = &params.start_date {
            url.push_str(&format!("&start_date={}", urlencode(start)));
        }
        if let Some(end) = &params.end_date {
            url.push_str(&format!("&end_date={}", urlencode(end)));
        }

        tracing::debug!(query = %params.query, max = params.max_results, "registry search");

        let resp = self.get_with_retry(&url).await?;
        let body: serde_json::Value = resp.json().await.map_err(from_reqwest)?;

        let papers = body
            .get("papers")
            .and_then(|p| p.as_array())
            .ok_or_else(|| Error::Http("registry response missing 'papers' array".into()))?;

        let mut results = Vec::with_capacity(papers.len());
        for p in papers {
            let mut meta: PaperMeta = serde_json::from_value(p.clone())?;
            if meta.pdf_url.is_empty() {
                meta.pdf_url = PaperMeta::default_pdf_url(&meta.arxiv_id);
            }
            results.push(meta);
        }

        tracing::debug!(found = results.len(), "registry search complete");
        Ok(results)
    }

    /// Fetch metadata for specific IDs.
    pub async fn get_papers_by_ids(&self, arxiv_ids: &[String]) -> Result<Vec<PaperMeta>> {
        if arxiv_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/papers?ids={}",
            self.base_url,
            urlencode(&arxiv_ids.join(","))
        );
        let resp = self.get_with_retry(&url).await?;
        let body: serde_json::Value = resp.json().await.map_err(from_reqwest)?;
        let papers = body
            .get("papers")
            .and_then(|p| p.as_array())
            .ok_or_else(|| Error::Http("registry response missing 'papers' array".into()))?;
        papers
            .iter()
            .map(|p| serde_json::from_value(p.clone()).map_err(Error::from))
            .collect()
    }

    /// Download a paper PDF to `save_path`.
    pub async fn download_pdf(&self, pdf_url: &str, save_path: &Path) -> Result<()> {
        tracing::debug!(url = %pdf_url, path = %save_path.display(), "downloading pdf");

        let resp = self.get_with_retry(pdf_url).await?;
        let bytes = resp.bytes().await.map_err(from_reqwest)?;

        let mut file = tokio::fs::File::create(save_path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        tracing::debug!(bytes = bytes.len(), "pdf downloaded");
        Ok(())
    }
}

/// Minimal percent-encoding for query string values.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_passes_safe_chars() {
        assert_eq!(urlencode("abc-123_.~"), "abc-123_.~");
    }

    #[test]
    fn urlencode_spaces_and_specials() {
        assert_eq!(urlencode("multi head attention"), "multi+head+attention");
        assert_eq!(urlencode("a&b=c"), "a%26b%3Dc");
    }

    #[test]
    fn search_params_default_is_empty() {
        let p = SearchParams::default();
        assert!(p.query.is_empty());
        assert!(p.start_date.is_none());
    }
}
