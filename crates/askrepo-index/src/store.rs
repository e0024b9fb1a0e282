//! Persisted chunk vectors with per-file replace and prune.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::chunker::Chunk;
use crate::error::{IndexError, Result};
use crate::persist::{read_json, write_atomic};

pub const INDEX_VERSION: u32 = 1;

/// One embedded chunk. Identity is `(path, chunk_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub path: String,
    pub hash: String,
    pub chunk_id: usize,
    pub start_line: usize,
    pub end_line: usize,
    /// `None` when the stored vector was missing or not a list of numbers.
    #[serde(
        default,
        deserialize_with = "lenient_vector",
        skip_serializing_if = "Option::is_none"
    )]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn lenient_vector<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<f32>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    pub version: u32,
    pub chunks: Vec<IndexEntry>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            chunks: Vec::new(),
        }
    }
}

impl VectorIndex {
    /// Load the index at `path`.
    ///
    /// A missing, unreadable, corrupt, or foreign-version file yields an empty index.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }

    /// Like [`VectorIndex::load`], but `None` when there was no usable index on disk.
    #[must_use]
    pub fn try_load(path: &Path) -> Option<Self> {
        let index = read_json::<Self>(path, "index")?;
        if index.version != INDEX_VERSION {
            tracing::warn!(
                path = %path.display(),
                version = index.version,
                "unsupported index version, starting fresh"
            );
            return None;
        }
        Some(index)
    }

    /// Rewrite the whole index atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        write_atomic(path, &json)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Distinct file paths present in the index, sorted.
    #[must_use]
    pub fn paths(&self) -> BTreeSet<&str> {
        self.chunks.iter().map(|e| e.path.as_str()).collect()
    }

    pub fn entries_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a IndexEntry> {
        self.chunks.iter().filter(move |e| e.path == path)
    }

    /// Replace every entry for `path` with one entry per `(chunk, vector)` pair.
    ///
    /// Returns the number of entries inserted. Leaves the index untouched when the
    /// counts differ.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::VectorCountMismatch` if `chunks` and `vectors` differ in length.
    pub fn upsert_file(
        &mut self,
        path: &str,
        hash: &str,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::VectorCountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }

        self.chunks.retain(|e| e.path != path);
        self.chunks.extend(
            chunks
                .iter()
                .zip(vectors)
                .enumerate()
                .map(|(chunk_id, (chunk, vector))| IndexEntry {
                    path: path.to_owned(),
                    hash: hash.to_owned(),
                    chunk_id,
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    vector: Some(vector),
                    updated_at: Some(now),
                }),
        );
        Ok(chunks.len())
    }

    /// Remove every entry whose path is in `paths`, returning how many were removed.
    pub fn prune_files<S: AsRef<str>>(&mut self, paths: &[S]) -> usize {
        if paths.is_empty() {
            return 0;
        }
        let doomed: HashSet<&str> = paths.iter().map(|p| p.as_ref()).collect();
        let before = self.chunks.len();
        self.chunks.retain(|e| !doomed.contains(e.path.as_str()));
        before - self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: usize, end: usize) -> Chunk {
        Chunk {
            text: String::new(),
            start_line: start,
            end_line: end,
        }
    }

    fn index_with(path: &str, hash: &str, n: usize) -> VectorIndex {
        let mut index = VectorIndex::default();
        let chunks: Vec<Chunk> = (0..n).map(|i| chunk(i * 10, i * 10 + 9)).collect();
        let vectors = vec![vec![1.0, 0.0]; n];
        index
            .upsert_file(path, hash, &chunks, vectors, Utc::now())
            .unwrap();
        index
    }

    #[test]
    fn upsert_replaces_stale_entries() {
        let mut index = index_with("a.rs", "old", 3);
        index
            .upsert_file("b.rs", "hb", &[chunk(0, 1)], vec![vec![0.0, 1.0]], Utc::now())
            .unwrap();

        let inserted = index
            .upsert_file(
                "a.rs",
                "new",
                &[chunk(0, 4), chunk(4, 8)],
                vec![vec![0.5, 0.5], vec![0.2, 0.8]],
                Utc::now(),
            )
            .unwrap();

        assert_eq!(inserted, 2);
        let a: Vec<_> = index.entries_for("a.rs").collect();
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|e| e.hash == "new"));
        assert_eq!(a.iter().map(|e| e.chunk_id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(index.entries_for("b.rs").count(), 1);
    }

    #[test]
    fn upsert_with_mismatched_vectors_is_rejected_untouched() {
        let mut index = index_with("a.rs", "old", 2);
        let before = index.clone();

        let err = index
            .upsert_file("a.rs", "new", &[chunk(0, 1), chunk(1, 2)], vec![vec![1.0]], Utc::now())
            .unwrap_err();

        assert!(matches!(
            err,
            IndexError::VectorCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(index, before);
    }

    #[test]
    fn upsert_with_no_chunks_clears_file() {
        let mut index = index_with("a.rs", "old", 2);
        let inserted = index
            .upsert_file("a.rs", "empty", &[], Vec::new(), Utc::now())
            .unwrap();
        assert_eq!(inserted, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn prune_counts_and_removes() {
        let mut index = index_with("a.rs", "ha", 3);
        index
            .upsert_file("b.rs", "hb", &[chunk(0, 1)], vec![vec![1.0]], Utc::now())
            .unwrap();

        assert_eq!(index.prune_files(&["a.rs", "missing.rs"]), 3);
        assert_eq!(index.entries_for("a.rs").count(), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn prune_empty_set_is_noop() {
        let mut index = index_with("a.rs", "ha", 2);
        let none: [&str; 0] = [];
        assert_eq!(index.prune_files(&none), 0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn save_load_roundtrip_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".askrepo/index.json");
        let index = index_with("src/lib.rs", "h", 2);

        index.save(&path).unwrap();
        assert_eq!(VectorIndex::load(&path), index);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let first = &raw["chunks"][0];
        for key in ["path", "hash", "chunkId", "startLine", "endLine", "vector", "updatedAt"] {
            assert!(first.get(key).is_some(), "missing {key}");
        }
        assert_eq!(raw["version"], 1);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::load(&dir.path().join("nope.json"));
        assert_eq!(index, VectorIndex::default());
    }

    #[test]
    fn corrupt_file_loads_empty_v1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{\"version\": 1, \"chunks\": [").unwrap();

        let index = VectorIndex::load(&path);
        assert_eq!(index.version, 1);
        assert!(index.chunks.is_empty());
    }

    #[test]
    fn foreign_version_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, r#"{"version": 7, "chunks": []}"#).unwrap();
        assert_eq!(VectorIndex::load(&path).version, INDEX_VERSION);
    }

    #[test]
    fn try_load_distinguishes_fallback_from_saved_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        assert!(VectorIndex::try_load(&path).is_none());

        std::fs::write(&path, "not json").unwrap();
        assert!(VectorIndex::try_load(&path).is_none());

        VectorIndex::default().save(&path).unwrap();
        assert_eq!(VectorIndex::try_load(&path), Some(VectorIndex::default()));
    }

    #[test]
    fn malformed_vectors_load_as_none() {
        let json = r#"{"version":1,"chunks":[
            {"path":"a","hash":"h","chunkId":0,"startLine":0,"endLine":1,"vector":"oops"},
            {"path":"a","hash":"h","chunkId":1,"startLine":2,"endLine":3},
            {"path":"a","hash":"h","chunkId":2,"startLine":4,"endLine":5,"vector":[1,2]}
        ]}"#;
        let index: VectorIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.chunks[0].vector, None);
        assert_eq!(index.chunks[1].vector, None);
        assert_eq!(index.chunks[2].vector, Some(vec![1.0, 2.0]));
        assert!(index.chunks.iter().all(|e| e.updated_at.is_none()));
    }

    #[test]
    fn paths_are_distinct_and_sorted() {
        let mut index = index_with("b.rs", "h", 2);
        index
            .upsert_file("a.rs", "h", &[chunk(0, 0)], vec![vec![1.0]], Utc::now())
            .unwrap();
        assert_eq!(index.paths().into_iter().collect::<Vec<_>>(), vec!["a.rs", "b.rs"]);
    }
}
