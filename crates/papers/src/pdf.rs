//! PDF text-extraction seam.
//!
//! Binary PDF decoding is an external concern; the pipeline depends only
//! on the [`PdfParser`] trait. [`PlainTextParser`] is the built-in
//! fallback: it pulls printable text runs out of the raw bytes and
//! detects section headings heuristically, which is enough for chunking
//! and lexical search. A production deployment plugs in a real extractor
//! behind the same trait.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use quill_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsed document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub text: String,
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub raw_text: String,
    pub sections: Vec<Section>,
}

impl ParsedDocument {
    /// Reference lines from a trailing "References" section, one per
    /// entry, used for citation exploration.
    pub fn reference_lines(&self) -> Vec<String> {
        let Some(refs) = self
            .sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case("references"))
        else {
            return Vec::new();
        };
        refs.text
            .lines()
            .map(str::trim)
            .filter(|l| l.len() > 20)
            .map(String::from)
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parser trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait PdfParser: Send + Sync {
    /// Extract text and sections from the PDF at `path`.
    async fn parse(&self, path: &Path, arxiv_id: &str) -> Result<ParsedDocument>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plain-text fallback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    // "1 Introduction", "2.3 Method details", "Abstract", "References"
    Regex::new(r"(?m)^(?:\d+(?:\.\d+)*\s+)?(Abstract|Introduction|Background|Related Work|Method(?:s|ology)?|Experiments?|Results?|Discussion|Evaluation|Conclusion[s]?|References|Appendix)\s*$").unwrap()
});

pub struct PlainTextParser;

impl PlainTextParser {
    /// Keep runs of printable characters, dropping binary noise. Runs
    /// shorter than four characters are discarded as artifacts.
    fn extract_text(bytes: &[u8]) -> String {
        let mut out = String::new();
        let mut run = String::new();
        for &b in bytes {
            let c = b as char;
            if c.is_ascii_graphic() || c == ' ' || c == '\n' {
                run.push(c);
            } else {
                if run.trim().len() >= 4 {
                    out.push_str(&run);
                    out.push('\n');
                }
                run.clear();
            }
        }
        if run.trim().len() >= 4 {
            out.push_str(&run);
        }
        out
    }

    /// Split extracted text into sections on recognized headings. Text
    /// before the first heading lands in a "Body" section.
    fn split_sections(text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut boundaries: Vec<(usize, String)> = HEADING_RE
            .find_iter(text)
            .map(|m| (m.start(), m.as_str().trim().to_string()))
            .collect();

        if boundaries.is_empty() {
            return vec![Section {
                name: "Body".into(),
                text: text.to_string(),
                page_number: None,
            }];
        }

        if boundaries[0].0 > 0 {
            sections.push(Section {
                name: "Body".into(),
                text: text[..boundaries[0].0].to_string(),
                page_number: None,
            });
        }

        boundaries.push((text.len(), String::new()));
        for pair in boundaries.windows(2) {
            let (start, ref name) = pair[0];
            let (end, _) = pair[1];
            let body = text[start..end].trim();
            if !body.is_empty() {
                // Strip the numbering prefix off "2.3 Methods"-style names.
                let clean_name = name
                    .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ' ')
                    .to_string();
                sections.push(Section {
                    name: clean_name,
                    text: body.to_string(),
                    page_number: None,
                });
            }
        }

        sections
    }
}

#[async_trait::async_trait]
impl PdfParser for PlainTextParser {
    async fn parse(&self, path: &Path, arxiv_id: &str) -> Result<ParsedDocument> {
        let bytes = tokio::fs::read(path).await?;
        let raw_text = Self::extract_text(&bytes);

        if raw_text.trim().is_empty() {
            return Err(Error::Other(format!(
                "no extractable text in PDF for {arxiv_id}"
            )));
        }

        let sections = Self::split_sections(&raw_text);
        tracing::debug!(
            arxiv_id,
            text_len = raw_text.len(),
            sections = sections.len(),
            "pdf parsed"
        );

        Ok(ParsedDocument { raw_text, sections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_drops_binary_noise() {
        let bytes = b"\x00\x01Attention is all you need\x02\x03ab\x01";
        let text = PlainTextParser::extract_text(bytes);
        assert!(text.contains("Attention is all you need"));
        assert!(!text.contains("ab"));
    }

    #[test]
    fn sections_split_on_headings() {
        let text = "Title line here\nAbstract\nWe study attention.\nIntroduction\nAttention mechanisms...\nReferences\n[1] Vaswani et al., Attention Is All You Need, 2017.\n";
        let sections = PlainTextParser::split_sections(text);
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Body"));
        assert!(names.contains(&"Abstract"));
        assert!(names.contains(&"Introduction"));
        assert!(names.contains(&"References"));
    }

    #[test]
    fn no_headings_yields_single_body() {
        let sections = PlainTextParser::split_sections("just some text without structure");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, "Body");
    }

    #[test]
    fn reference_lines_filter_short_entries() {
        let doc = ParsedDocument {
            raw_text: String::new(),
            sections: vec![Section {
                name: "References".into(),
                text: "References\n[1] Vaswani et al., Attention Is All You Need, NeurIPS 2017.\nshort\n[2] Devlin et al., BERT: Pre-training of Deep Bidirectional Transformers, 2019.\n".into(),
                page_number: None,
            }],
        };
        let refs = doc.reference_lines();
        assert_eq!(refs.len(), 2);
        assert!(refs[0].contains("Vaswani"));
    }

    #[test]
    fn reference_lines_empty_without_section() {
        let doc = ParsedDocument {
            raw_text: String::new(),
            sections: vec![],
        };
        assert!(doc.reference_lines().is_empty());
    }

    #[tokio::test]
    async fn parse_rejects_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pdf");
        tokio::fs::write(&path, b"\x00\x01\x02").await.unwrap();
        let result = PlainTextParser.parse(&path, "2401.00001").await;
        assert!(result.is_err());
    }
}
