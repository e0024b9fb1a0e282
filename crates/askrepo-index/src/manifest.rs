//! Scan snapshots and the diff between two of them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::persist::{read_json, write_atomic};
use crate::scanner::ScanResult;

/// One scanned file. Identity is `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    #[serde(rename = "sizeKB")]
    pub size_kb: u64,
    pub hash: String,
}

/// Models the index was built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelNames {
    pub embed: String,
    pub chat: String,
}

/// Snapshot persisted after each successful `read` cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub root: String,
    pub files_total: usize,
    pub files_with_hashes: Vec<FileRecord>,
    pub languages: BTreeMap<String, usize>,
    pub max_file_kb: u64,
    pub models: ModelNames,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    #[must_use]
    pub fn new(root: &Path, scan: ScanResult, max_file_kb: u64, models: ModelNames) -> Self {
        Self {
            root: root.display().to_string(),
            files_total: scan.files.len(),
            files_with_hashes: scan.files,
            languages: scan.languages,
            max_file_kb,
            models,
            created_at: Utc::now(),
        }
    }

    /// Load the previous snapshot; absent or corrupt files yield `None`.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        read_json(path, "manifest")
    }

    /// # Errors
    ///
    /// Returns an error if the manifest cannot be serialized or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }

    #[must_use]
    pub fn files(&self) -> &[FileRecord] {
        &self.files_with_hashes
    }

    /// Put back the baseline state of paths whose update failed.
    ///
    /// A failed path keeps its `previous` record, or is dropped if it had none,
    /// so the next cycle sees it as changed or added again.
    pub fn retain_previous_for(&mut self, failed: &HashSet<&str>, previous: Option<&Manifest>) {
        if failed.is_empty() {
            return;
        }
        let before: HashMap<&str, &FileRecord> = previous
            .map(|m| m.files().iter().map(|f| (f.path.as_str(), f)).collect())
            .unwrap_or_default();

        self.files_with_hashes = std::mem::take(&mut self.files_with_hashes)
            .into_iter()
            .filter_map(|record| {
                if !failed.contains(record.path.as_str()) {
                    return Some(record);
                }
                before.get(record.path.as_str()).map(|&old| old.clone())
            })
            .collect();
        self.files_total = self.files_with_hashes.len();
    }
}

/// Files to (re)index and files to forget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub added: Vec<FileRecord>,
    pub changed: Vec<FileRecord>,
    pub removed: Vec<String>,
}

impl ManifestDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// `added` followed by `changed`, in scan order within each.
    pub fn pending(&self) -> impl Iterator<Item = &FileRecord> {
        self.added.iter().chain(&self.changed)
    }

    /// Append paths to `removed` unless already listed.
    pub fn extend_removed<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen: HashSet<String> = self.removed.iter().cloned().collect();
        for path in paths {
            if seen.insert(path.clone()) {
                self.removed.push(path);
            }
        }
    }
}

/// Compare the current scan against the previous snapshot.
///
/// With no previous snapshot every current file is `added`.
#[must_use]
pub fn diff(previous: Option<&Manifest>, current: &[FileRecord]) -> ManifestDiff {
    let Some(previous) = previous else {
        return ManifestDiff {
            added: current.to_vec(),
            ..ManifestDiff::default()
        };
    };

    let before: HashMap<&str, &str> = previous
        .files()
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();
    let now: HashSet<&str> = current.iter().map(|f| f.path.as_str()).collect();

    let mut result = ManifestDiff::default();
    for record in current {
        match before.get(record.path.as_str()) {
            None => result.added.push(record.clone()),
            Some(&hash) if hash != record.hash => result.changed.push(record.clone()),
            Some(_) => {}
        }
    }
    result.removed = previous
        .files()
        .iter()
        .filter(|f| !now.contains(f.path.as_str()))
        .map(|f| f.path.clone())
        .collect();
    result
}
