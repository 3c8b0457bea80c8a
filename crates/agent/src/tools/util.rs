//! Shared helpers for tool argument handling and prompt formatting.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde_json::Value;

static SHORT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}-\d{2}$").unwrap());

/// Parse `YYYY-MM-DD`, or `MM-DD` defaulting to the current year.
/// `None`/empty pass through; malformed input is a descriptive error.
pub fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, String> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let normalized = if SHORT_DATE_RE.is_match(value) {
        format!("{}-{value}", chrono::Utc::now().year())
    } else {
        value.to_string()
    };

    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| format!("Invalid {field}: '{value}'. Expected format: YYYY-MM-DD"))
}

/// Format one paper object into compact prompt text. Works with both
/// search-result and knowledge-base shapes.
pub fn format_paper_for_prompt(paper: &Value, index: usize) -> String {
    let authors: Vec<String> = paper
        .get("authors")
        .and_then(|a| a.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let author_str = match authors.len() {
        0 => "Unknown".to_string(),
        1..=3 => authors.join(", "),
        _ => format!("{}, {}, {} et al.", authors[0], authors[1], authors[2]),
    };

    let title = paper
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("Untitled");

    let mut lines = vec![format!("{index}. \"{title}\" by {author_str}")];

    let mut meta_parts = Vec::new();
    if let Some(id) = paper.get("arxiv_id").and_then(|v| v.as_str()) {
        meta_parts.push(format!("ID: {id}"));
    }
    if let Some(date) = paper.get("published_date").and_then(|v| v.as_str()) {
        meta_parts.push(human_date(date));
    }
    if let Some(cats) = paper.get("categories").and_then(|v| v.as_array()) {
        let joined = cats
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            meta_parts.push(joined);
        }
    }
    if !meta_parts.is_empty() {
        lines.push(format!("   {}", meta_parts.join(" | ")));
    }

    let abstract_keys = ["abstract_text", "abstract"];
    if let Some(abstract_text) = abstract_keys
        .iter()
        .find_map(|k| paper.get(*k).and_then(|v| v.as_str()))
        .filter(|a| !a.is_empty())
    {
        let capped = if abstract_text.len() > 150 {
            let cut = &abstract_text[..floor_char_boundary(abstract_text, 150)];
            let trimmed = cut.rsplit_once(' ').map(|(head, _)| head).unwrap_or(cut);
            format!("{trimmed}...")
        } else {
            abstract_text.to_string()
        };
        lines.push(format!("   {capped}"));
    }

    lines.join("\n")
}

/// `2024-01-15...` style dates rendered as `Jan 15, 2024`; anything
/// unparseable passes through untouched.
fn human_date(raw: &str) -> String {
    let head: String = raw.chars().take(10).collect();
    NaiveDate::parse_from_str(&head, "%Y-%m-%d")
        .map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

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

    #[test]
    fn parse_date_accepts_full_iso() {
        let date = parse_date(Some("2024-02-14"), "start_date").unwrap().unwrap();
        assert_eq!(date.to_string(), "2024-02-14");
    }

    #[test]
    fn parse_date_short_form_uses_current_year() {
        let date = parse_date(Some("02-14"), "start_date").unwrap().unwrap();
        assert_eq!(date.year(), chrono::Utc::now().year());
        assert_eq!(date.month(), 2);
    }

    #[test]
    fn parse_date_none_passes_through() {
        assert!(parse_date(None, "start_date").unwrap().is_none());
        assert!(parse_date(Some(""), "start_date").unwrap().is_none());
    }

    #[test]
    fn parse_date_malformed_is_descriptive() {
        let err = parse_date(Some("Feb 14"), "end_date").unwrap_err();
        assert!(err.contains("end_date"));
        assert!(err.contains("YYYY-MM-DD"));
    }

    #[test]
    fn format_paper_truncates_author_list() {
        let paper = serde_json::json!({
            "title": "Big Collab",
            "arxiv_id": "2401.00001",
            "authors": ["A", "B", "C", "D", "E"],
        });
        let text = format_paper_for_prompt(&paper, 1);
        assert!(text.contains("A, B, C et al."));
        assert!(!text.contains("D"));
    }

    #[test]
    fn format_paper_humanizes_dates() {
        let paper = serde_json::json!({
            "title": "T",
            "published_date": "2024-01-15",
        });
        let text = format_paper_for_prompt(&paper, 1);
        assert!(text.contains("Jan 15, 2024"));
        assert!(!text.contains("2024-01-15"));
    }

    #[test]
    fn format_paper_caps_abstract() {
        let paper = serde_json::json!({
            "title": "T",
            "abstract": "word ".repeat(100),
        });
        let text = format_paper_for_prompt(&paper, 2);
        assert!(text.contains("..."));
        assert!(text.len() < 300);
    }
}
