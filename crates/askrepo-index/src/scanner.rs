//! Repository walk: include/exclude filtering, size cap, content hashing.

use std::collections::BTreeMap;
use std::path::Path;

use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};

use crate::error::Result;
use crate::manifest::FileRecord;

/// What to scan and what to leave out.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Gitignore-style globs a file must match; empty admits every file.
    pub include: Vec<String>,
    /// Gitignore-style globs that drop a file or directory.
    pub exclude: Vec<String>,
    /// Files larger than this many KiB are skipped.
    pub max_file_kb: u64,
    pub respect_gitignore: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_kb: 256,
            respect_gitignore: true,
        }
    }
}

/// Files found by one scan, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub files: Vec<FileRecord>,
    /// Lowercase extension (without the dot) → number of files.
    pub languages: BTreeMap<String, usize>,
}

/// Walk `root` and hash every admitted file.
///
/// Unreadable and oversized files are skipped rather than reported.
///
/// # Errors
///
/// Returns an error if an include or exclude pattern is not a valid glob.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<ScanResult> {
    let overrides = build_overrides(root, options)?;

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .overrides(overrides)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    let mut oversized = 0usize;

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Some(rel_path) = relative_path(root, entry.path()) else {
            continue;
        };

        let Ok(meta) = entry.metadata() else {
            tracing::debug!(path = %rel_path, "skipping file without metadata");
            continue;
        };
        if size_kb(meta.len()) > options.max_file_kb {
            tracing::debug!(path = %rel_path, bytes = meta.len(), "skipping oversized file");
            oversized += 1;
            continue;
        }

        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(path = %rel_path, "skipping unreadable file: {e}");
                continue;
            }
        };
        let size = size_kb(bytes.len() as u64);
        if size > options.max_file_kb {
            oversized += 1;
            continue;
        }

        files.push(FileRecord {
            path: rel_path,
            size_kb: size,
            hash: content_hash(&bytes),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    let languages = tally_languages(&files);

    tracing::info!(
        files = files.len(),
        oversized,
        root = %root.display(),
        "scan complete"
    );

    Ok(ScanResult { files, languages })
}

/// Lowercase hex BLAKE3 digest of the full file bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Size in KiB, rounded up so any non-empty file counts as at least 1.
#[must_use]
pub fn size_kb(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

fn build_overrides(root: &Path, options: &ScanOptions) -> Result<Override> {
    let mut builder = OverrideBuilder::new(root);
    for glob in &options.include {
        builder.add(glob)?;
    }
    // later globs take precedence, so excludes win over includes
    for glob in &options.exclude {
        builder.add(&format!("!{glob}"))?;
    }
    Ok(builder.build()?)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn tally_languages(files: &[FileRecord]) -> BTreeMap<String, usize> {
    let mut languages = BTreeMap::new();
    for file in files {
        if let Some(ext) = Path::new(&file.path)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
        {
            *languages.entry(ext.to_lowercase()).or_insert(0) += 1;
        }
    }
    languages
}
