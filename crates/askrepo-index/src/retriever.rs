//! Cosine ranking with one-chunk-per-file diversification.

use std::collections::{HashMap, HashSet};

use crate::chunker::sanitize;
use crate::source::FileSource;
use crate::store::{IndexEntry, VectorIndex};

/// Score bonus for entries that carry `updatedAt`. Orders near-ties only.
pub const RECENCY_EPSILON: f32 = 1e-6;

/// A retrieved line range with its text, ready to hand to the chat model.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBlock {
    pub path: String,
    /// 0-based, inclusive.
    pub start_line: usize,
    /// 0-based, inclusive.
    pub end_line: usize,
    /// Empty when the file could not be re-read.
    pub text: String,
    pub score: f32,
}

impl ContextBlock {
    /// `path:start-end` with 1-based inclusive line numbers.
    #[must_use]
    pub fn citation(&self) -> String {
        format!("{}:{}-{}", self.path, self.start_line + 1, self.end_line + 1)
    }
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct Scored<'a> {
    entry: &'a IndexEntry,
    score: f32,
}

/// Rank `index` against `query` and return up to `k` diversified blocks.
///
/// Each file's best chunk is taken first, best files first. Slots left over once
/// every file is represented are filled from the global ranking. Entries whose
/// vector is missing, empty, non-finite, or of a different dimension are skipped.
#[must_use]
pub fn retrieve<S>(index: &VectorIndex, query: &[f32], k: usize, source: &S) -> Vec<ContextBlock>
where
    S: FileSource + ?Sized,
{
    if k == 0 || query.is_empty() {
        return Vec::new();
    }

    let ranked = rank(index, query);
    if ranked.is_empty() {
        return Vec::new();
    }

    let selected = diversify(&ranked, k);
    tracing::debug!(candidates = ranked.len(), selected = selected.len(), "retrieval");

    let mut files: HashMap<&str, Option<Vec<String>>> = HashMap::new();
    selected
        .into_iter()
        .map(|hit| {
            let entry = hit.entry;
            let lines = files.entry(entry.path.as_str()).or_insert_with(|| {
                match source.read(&entry.path) {
                    Ok(bytes) => Some(sanitize(&bytes).lines().map(str::to_owned).collect()),
                    Err(e) => {
                        tracing::warn!(path = %entry.path, "cannot re-read file: {e}");
                        None
                    }
                }
            });
            ContextBlock {
                path: entry.path.clone(),
                start_line: entry.start_line,
                end_line: entry.end_line,
                text: lines
                    .as_deref()
                    .map(|l| slice_lines(l, entry.start_line, entry.end_line))
                    .unwrap_or_default(),
                score: hit.score,
            }
        })
        .collect()
}

fn rank<'a>(index: &'a VectorIndex, query: &[f32]) -> Vec<Scored<'a>> {
    let mut ranked: Vec<Scored<'a>> = index
        .chunks
        .iter()
        .filter_map(|entry| {
            let vector = entry.vector.as_deref()?;
            if vector.len() != query.len() || vector.iter().any(|x| !x.is_finite()) {
                return None;
            }
            let mut score = cosine_similarity(query, vector);
            if entry.updated_at.is_some() {
                score += RECENCY_EPSILON;
            }
            Some(Scored { entry, score })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.entry.path.cmp(&b.entry.path))
            .then_with(|| a.entry.chunk_id.cmp(&b.entry.chunk_id))
    });
    ranked
}

/// Pick representatives then fill. `ranked` must be sorted best first.
fn diversify<'a>(ranked: &[Scored<'a>], k: usize) -> Vec<Scored<'a>> {
    let mut seen_files = HashSet::new();
    let mut taken = vec![false; ranked.len()];
    let mut picked = Vec::with_capacity(k.min(ranked.len()));

    for (i, hit) in ranked.iter().enumerate() {
        if picked.len() == k {
            break;
        }
        if seen_files.insert(hit.entry.path.as_str()) {
            taken[i] = true;
            picked.push(i);
        }
    }
    for (i, done) in taken.iter().enumerate() {
        if picked.len() == k {
            break;
        }
        if !done {
            picked.push(i);
        }
    }

    picked
        .into_iter()
        .map(|i| Scored {
            entry: ranked[i].entry,
            score: ranked[i].score,
        })
        .collect()
}

fn slice_lines(lines: &[String], start: usize, end: usize) -> String {
    if start >= lines.len() {
        return String::new();
    }
    let end = end.min(lines.len() - 1);
    lines[start..=end].join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::source::MemorySource;

    fn entry(path: &str, chunk_id: usize, lines: (usize, usize), vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            path: path.into(),
            hash: "h".into(),
            chunk_id,
            start_line: lines.0,
            end_line: lines.1,
            vector: Some(vector),
            updated_at: None,
        }
    }

    /// Unit vector at angle `acos(score)` from `[1, 0]`, so cosine with `[1, 0]` is `score`.
    fn scored(score: f32) -> Vec<f32> {
        vec![score, (1.0 - score * score).sqrt()]
    }

    fn index(entries: Vec<IndexEntry>) -> VectorIndex {
        VectorIndex {
            chunks: entries,
            ..VectorIndex::default()
        }
    }

    fn source() -> MemorySource {
        MemorySource::default()
            .with_file("a.rs", "a0\na1\na2\na3")
            .with_file("b.rs", "b0\nb1")
            .with_file("c.rs", "c0")
    }

    fn cited(blocks: &[ContextBlock]) -> Vec<(&str, usize)> {
        blocks.iter().map(|b| (b.path.as_str(), b.start_line)).collect()
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn one_per_file_before_repeats() {
        let idx = index(vec![
            entry("a.rs", 0, (0, 0), scored(0.9)),
            entry("a.rs", 1, (2, 3), scored(0.85)),
            entry("b.rs", 0, (0, 1), scored(0.95)),
        ]);
        let query = [1.0, 0.0];

        let top1 = retrieve(&idx, &query, 1, &source());
        assert_eq!(cited(&top1), vec![("b.rs", 0)]);

        let top2 = retrieve(&idx, &query, 2, &source());
        assert_eq!(cited(&top2), vec![("b.rs", 0), ("a.rs", 0)]);

        let top3 = retrieve(&idx, &query, 3, &source());
        assert_eq!(cited(&top3), vec![("b.rs", 0), ("a.rs", 0), ("a.rs", 2)]);
    }

    #[test]
    fn fewer_entries_than_k() {
        let idx = index(vec![entry("c.rs", 0, (0, 0), scored(0.5))]);
        let blocks = retrieve(&idx, &[1.0, 0.0], 6, &source());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "c0");
    }

    #[test]
    fn zero_k_or_empty_index_is_empty() {
        let idx = index(vec![entry("c.rs", 0, (0, 0), scored(0.5))]);
        assert!(retrieve(&idx, &[1.0, 0.0], 0, &source()).is_empty());
        assert!(retrieve(&VectorIndex::default(), &[1.0, 0.0], 3, &source()).is_empty());
    }

    #[test]
    fn unusable_vectors_are_skipped() {
        let mut missing = entry("a.rs", 0, (0, 0), vec![]);
        missing.vector = None;
        let idx = index(vec![
            missing,
            entry("a.rs", 1, (1, 1), vec![]),
            entry("a.rs", 2, (2, 2), vec![1.0, 0.0, 0.0]),
            entry("a.rs", 3, (3, 3), vec![f32::NAN, 1.0]),
            entry("b.rs", 0, (0, 0), scored(0.1)),
        ]);
        let blocks = retrieve(&idx, &[1.0, 0.0], 5, &source());
        assert_eq!(cited(&blocks), vec![("b.rs", 0)]);
    }

    #[test]
    fn recency_breaks_exact_ties_only() {
        let mut fresh = entry("b.rs", 0, (0, 0), scored(0.5));
        fresh.updated_at = Some(Utc::now());
        let idx = index(vec![
            entry("a.rs", 0, (0, 0), scored(0.5)),
            fresh,
            entry("c.rs", 0, (0, 0), scored(0.6)),
        ]);
        let blocks = retrieve(&idx, &[1.0, 0.0], 3, &source());
        assert_eq!(cited(&blocks), vec![("c.rs", 0), ("b.rs", 0), ("a.rs", 0)]);
    }

    #[test]
    fn ties_are_deterministic() {
        let idx = index(vec![
            entry("b.rs", 0, (0, 0), scored(0.5)),
            entry("a.rs", 1, (1, 1), scored(0.5)),
            entry("a.rs", 0, (0, 0), scored(0.5)),
        ]);
        let first = retrieve(&idx, &[1.0, 0.0], 3, &source());
        assert_eq!(cited(&first), vec![("a.rs", 0), ("b.rs", 0), ("a.rs", 1)]);
        assert_eq!(first, retrieve(&idx, &[1.0, 0.0], 3, &source()));
    }

    #[test]
    fn text_is_sliced_from_current_file() {
        let idx = index(vec![entry("a.rs", 0, (1, 2), scored(0.9))]);
        let blocks = retrieve(&idx, &[1.0, 0.0], 1, &source());
        assert_eq!(blocks[0].text, "a1\na2");
        assert_eq!(blocks[0].citation(), "a.rs:2-3");
    }

    #[test]
    fn range_past_end_of_shrunken_file_is_clamped() {
        let idx = index(vec![
            entry("b.rs", 0, (1, 9), scored(0.9)),
            entry("c.rs", 0, (5, 6), scored(0.8)),
        ]);
        let blocks = retrieve(&idx, &[1.0, 0.0], 2, &source());
        assert_eq!(blocks[0].text, "b1");
        assert_eq!(blocks[1].text, "");
    }

    #[test]
    fn unreadable_file_yields_empty_text() {
        let idx = index(vec![
            entry("gone.rs", 0, (0, 3), scored(0.9)),
            entry("c.rs", 0, (0, 0), scored(0.1)),
        ]);
        let blocks = retrieve(&idx, &[1.0, 0.0], 2, &source());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].path, "gone.rs");
        assert!(blocks[0].text.is_empty());
        assert_eq!(blocks[1].text, "c0");
    }
}
