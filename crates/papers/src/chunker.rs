//! Paragraph-packing chunker.
//!
//! Splits section text on blank lines and packs paragraphs into chunks
//! of roughly `chunk_size` characters with `overlap` characters carried
//! between neighbours, preserving the owning section name.

use crate::pdf::Section;

#[derive(Debug, Clone)]
pub struct DocChunk {
    pub text: String,
    pub section_name: Option<String>,
    pub page_number: Option<u32>,
    /// Zero-based position within the document.
    pub index: usize,
}

pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    /// Chunks shorter than this are dropped as noise.
    min_chunk_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 150,
            min_chunk_chars: 80,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size / 2),
            min_chunk_chars: 80,
        }
    }

    /// Chunk a parsed document section by section.
    pub fn chunk_document(&self, sections: &[Section]) -> Vec<DocChunk> {
        let mut chunks = Vec::new();
        for section in sections {
            self.chunk_section(section, &mut chunks);
        }
        tracing::debug!(sections = sections.len(), chunks = chunks.len(), "document chunked");
        chunks
    }

    fn chunk_section(&self, section: &Section, out: &mut Vec<DocChunk>) {
        let paragraphs: Vec<&str> = section
            .text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let mut current = String::new();
        for para in paragraphs {
            // A single oversized paragraph is split hard at chunk_size.
            if para.len() > self.chunk_size {
                if !current.is_empty() {
                    self.push_chunk(&current, section, out);
                    current.clear();
                }
                for piece in split_at_boundaries(para, self.chunk_size, self.overlap) {
                    self.push_chunk(&piece, section, out);
                }
                continue;
            }

            if current.len() + para.len() + 1 > self.chunk_size && !current.is_empty() {
                self.push_chunk(&current, section, out);
                // Carry a tail of the previous chunk as overlap.
                let tail_start = current.len().saturating_sub(self.overlap);
                current = current[floor_char_boundary(&current, tail_start)..].to_string();
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(para);
        }

        if !current.is_empty() {
            self.push_chunk(&current, section, out);
        }
    }

    fn push_chunk(&self, text: &str, section: &Section, out: &mut Vec<DocChunk>) {
        let text = text.trim();
        if text.len() < self.min_chunk_chars {
            return;
        }
        out.push(DocChunk {
            text: text.to_string(),
            section_name: Some(section.name.clone()),
            page_number: section.page_number,
            index: out.len(),
        });
    }
}

/// Split a long run of text into pieces of at most `size` characters,
/// preferring whitespace boundaries, carrying `overlap` between pieces.
fn split_at_boundaries(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let hard_end = floor_char_boundary(text, (start + size).min(text.len()));
        let end = if hard_end < text.len() {
            text[start..hard_end]
                .rfind(char::is_whitespace)
                .map(|i| start + i)
                .filter(|&i| i > start)
                .unwrap_or(hard_end)
        } else {
            hard_end
        };
        pieces.push(text[start..end].trim().to_string());
        if end >= text.len() {
            break;
        }
        // Step back for overlap, but always make forward progress.
        let next = floor_char_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }
    pieces
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(text: &str) -> Section {
        Section {
            name: "Introduction".into(),
            text: text.into(),
            page_number: None,
        }
    }

    #[test]
    fn short_section_single_chunk() {
        let chunker = Chunker::default();
        let text = "a".repeat(200);
        let chunks = chunker.chunk_document(&[section(&text)]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_name.as_deref(), Some("Introduction"));
    }

    #[test]
    fn tiny_fragments_are_dropped() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk_document(&[section("too short")]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn paragraphs_pack_until_chunk_size() {
        let chunker = Chunker::new(300, 50);
        let para = "x".repeat(120);
        let text = format!("{para}\n\n{para}\n\n{para}\n\n{para}");
        let chunks = chunker.chunk_document(&[section(&text)]);
        assert!(chunks.len() >= 2, "expected multiple chunks, got {}", chunks.len());
        for c in &chunks {
            assert!(c.text.len() <= 300 + 120, "chunk too large: {}", c.text.len());
        }
    }

    #[test]
    fn oversized_paragraph_is_split() {
        let chunker = Chunker::new(300, 50);
        let text = "word ".repeat(200); // 1000 chars, one paragraph
        let chunks = chunker.chunk_document(&[section(&text)]);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.text.len() <= 300);
        }
    }

    #[test]
    fn chunk_indexes_are_sequential() {
        let chunker = Chunker::new(300, 50);
        let text = "word ".repeat(400);
        let chunks = chunker.chunk_document(&[section(&text)]);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let chunker = Chunker::new(100, 20);
        let text = "统计学习方法与注意力机制研究。".repeat(30);
        let chunks = chunker.chunk_document(&[section(&text)]);
        assert!(!chunks.is_empty());
    }
}
