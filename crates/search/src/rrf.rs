//! Reciprocal-rank fusion.
//!
//! Each chunk at rank `r` (zero-based) in a result list contributes
//! `1 / (r + 1 + k)` to its fused score, summed across lists. Chunks
//! are deduplicated by `chunk_id` keeping the first-seen metadata, and
//! returned scores are normalized so the top result is exactly `1.0`.

use std::collections::HashMap;

use quill_domain::paper::Chunk;

/// Fuse ranked result lists into a single top-`top_k` ranking.
pub fn fuse(lists: &[Vec<Chunk>], k_rrf: u32, top_k: usize) -> Vec<Chunk> {
    let k = k_rrf as f32;
    let mut scores: HashMap<String, f32> = HashMap::new();
    // chunk_id -> first-seen metadata, in encounter order for stable ties.
    let mut first_seen: Vec<Chunk> = Vec::new();

    for list in lists {
        for (rank, chunk) in list.iter().enumerate() {
            let contribution = 1.0 / (rank as f32 + 1.0 + k);
            let entry = scores.entry(chunk.chunk_id.clone()).or_insert_with(|| {
                first_seen.push(chunk.clone());
                0.0
            });
            *entry += contribution;
        }
    }

    first_seen.sort_by(|a, b| {
        let sa = scores.get(&a.chunk_id).copied().unwrap_or(0.0);
        let sb = scores.get(&b.chunk_id).copied().unwrap_or(0.0);
        sb.total_cmp(&sa)
    });
    first_seen.truncate(top_k);

    // Normalize: the best fused score maps to 1.0.
    let max = first_seen
        .first()
        .and_then(|c| scores.get(&c.chunk_id))
        .copied()
        .unwrap_or(0.0);
    if max > 0.0 {
        for chunk in &mut first_seen {
            chunk.score = scores.get(&chunk.chunk_id).copied().unwrap_or(0.0) / max;
        }
    }

    first_seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> Chunk {
        Chunk {
            chunk_id: id.into(),
            arxiv_id: "2401.00001".into(),
            title: "T".into(),
            authors: vec![],
            chunk_text: format!("text {id}"),
            section_name: None,
            page_number: None,
            score: 0.0,
            pdf_url: "u".into(),
            published_date: None,
        }
    }

    #[test]
    fn top_result_is_normalized_to_one() {
        let fused = fuse(
            &[vec![chunk("a"), chunk("b")], vec![chunk("a"), chunk("c")]],
            60,
            3,
        );
        assert_eq!(fused[0].chunk_id, "a");
        assert!((fused[0].score - 1.0).abs() < 1e-6);
        for c in &fused[1..] {
            assert!(c.score > 0.0 && c.score <= 1.0);
        }
    }

    #[test]
    fn chunk_in_both_lists_outranks_single_list() {
        // "b" is rank 0 in one list; "a" is rank 1 in both. Two
        // second-place contributions beat one first-place at k=60.
        let fused = fuse(
            &[vec![chunk("b"), chunk("a")], vec![chunk("c"), chunk("a")]],
            60,
            3,
        );
        assert_eq!(fused[0].chunk_id, "a");
    }

    #[test]
    fn dedup_keeps_first_seen_metadata() {
        let mut first = chunk("a");
        first.title = "first".into();
        let mut second = chunk("a");
        second.title = "second".into();
        let fused = fuse(&[vec![first], vec![second]], 60, 5);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].title, "first");
    }

    #[test]
    fn truncates_to_top_k() {
        let fused = fuse(&[vec![chunk("a"), chunk("b"), chunk("c")]], 60, 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(fuse(&[], 60, 5).is_empty());
        assert!(fuse(&[vec![]], 60, 5).is_empty());
    }
}
