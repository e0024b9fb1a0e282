//! Apply a manifest diff to the index: prune, then chunk → embed → upsert.

use std::collections::HashSet;
use std::fmt;

use askrepo_llm::{EmbeddingGateway, FailureKind};
use chrono::Utc;

use crate::chunker::Chunker;
use crate::error::{IndexError, Result};
use crate::manifest::{FileRecord, ManifestDiff};
use crate::source::FileSource;
use crate::store::VectorIndex;

/// A file that could not be indexed this cycle.
#[derive(Debug)]
pub struct FileFailure {
    pub path: String,
    pub error: IndexError,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}

/// Summary of one update pass.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Files chunked, embedded and upserted successfully.
    pub processed: usize,
    pub new_chunks: usize,
    pub removed_chunks: usize,
    pub failures: Vec<FileFailure>,
    pub duration_ms: u64,
}

impl UpdateReport {
    #[must_use]
    pub fn failed_paths(&self) -> HashSet<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }

    /// Failures caused by the model service being unreachable.
    #[must_use]
    pub fn unavailable_count(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.error.failure_kind() == Some(FailureKind::ServiceUnavailable))
            .count()
    }
}

/// Brings a [`VectorIndex`] in line with a [`ManifestDiff`].
pub struct IndexUpdater<'a, G, S> {
    chunker: &'a Chunker,
    gateway: &'a G,
    model: &'a str,
    source: &'a S,
}

impl<'a, G: EmbeddingGateway, S: FileSource> IndexUpdater<'a, G, S> {
    #[must_use]
    pub fn new(chunker: &'a Chunker, gateway: &'a G, model: &'a str, source: &'a S) -> Self {
        Self {
            chunker,
            gateway,
            model,
            source,
        }
    }

    /// Prune `removed`, then re-index `added` and `changed` in order.
    ///
    /// A file that fails keeps whatever entries it had before and is reported in
    /// [`UpdateReport::failures`]; the remaining files are still processed.
    pub async fn update(&self, index: &mut VectorIndex, diff: &ManifestDiff) -> UpdateReport {
        let start = std::time::Instant::now();
        let mut report = UpdateReport {
            removed_chunks: index.prune_files(&diff.removed),
            ..UpdateReport::default()
        };
        if !diff.removed.is_empty() {
            tracing::info!(
                files = diff.removed.len(),
                chunks = report.removed_chunks,
                "pruned removed files"
            );
        }

        let total = diff.added.len() + diff.changed.len();
        if total > 0 {
            tracing::info!(total, model = self.model, "indexing started");
        }

        for (i, record) in diff.pending().enumerate() {
            match self.index_file(index, record).await {
                Ok(created) => {
                    report.processed += 1;
                    report.new_chunks += created;
                    tracing::debug!(
                        file = %record.path,
                        progress = format_args!("{}/{total}", i + 1),
                        created,
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        file = %record.path,
                        kind = ?error.failure_kind(),
                        "indexing failed: {error}"
                    );
                    report.failures.push(FileFailure {
                        path: record.path.clone(),
                        error,
                    });
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        report
    }

    async fn index_file(&self, index: &mut VectorIndex, record: &FileRecord) -> Result<usize> {
        let bytes = self.source.read(&record.path)?;
        let chunks = self.chunker.chunk_bytes(&bytes);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.gateway.embed(self.model, &texts).await?
        };

        index.upsert_file(&record.path, &record.hash, &chunks, vectors, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use askrepo_llm::mock::MockEmbedder;

    use super::*;
    use crate::chunker::ChunkerConfig;
    use crate::source::MemorySource;

    fn rec(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: path.into(),
            size_kb: 1,
            hash: hash.into(),
        }
    }

    fn small_chunker() -> Chunker {
        Chunker::new(ChunkerConfig {
            max_chars: 12,
            overlap_chars: 0,
            max_overlap_lines: 0,
        })
    }

    #[tokio::test]
    async fn indexes_added_files() {
        let source = MemorySource::default()
            .with_file("a.txt", "alpha\nbeta\ngamma\ndelta")
            .with_file("b.txt", "one line");
        let embedder = MockEmbedder::default();
        let chunker = small_chunker();
        let updater = IndexUpdater::new(&chunker, &embedder, "embed", &source);
        let diff = ManifestDiff {
            added: vec![rec("a.txt", "ha"), rec("b.txt", "hb")],
            ..ManifestDiff::default()
        };
        let mut index = VectorIndex::default();

        let report = updater.update(&mut index, &diff).await;

        assert_eq!(report.processed, 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.new_chunks, index.len());
        assert_eq!(index.entries_for("a.txt").count(), 2);
        assert_eq!(index.entries_for("b.txt").count(), 1);
        assert_eq!(embedder.embedded_count(), 3);
    }

    #[tokio::test]
    async fn failure_keeps_previous_entries_and_continues() {
        let source = MemorySource::default()
            .with_file("bad.txt", "POISON here")
            .with_file("good.txt", "fine");
        let embedder = MockEmbedder::failing_on("POISON");
        let chunker = small_chunker();
        let updater = IndexUpdater::new(&chunker, &embedder, "embed", &source);

        let mut index = VectorIndex::default();
        index
            .upsert_file(
                "bad.txt",
                "old",
                &[crate::chunker::Chunk {
                    text: "old".into(),
                    start_line: 0,
                    end_line: 0,
                }],
                vec![vec![1.0]],
                Utc::now(),
            )
            .unwrap();

        let diff = ManifestDiff {
            added: vec![rec("good.txt", "hg")],
            changed: vec![rec("bad.txt", "new")],
            ..ManifestDiff::default()
        };
        let report = updater.update(&mut index, &diff).await;

        assert_eq!(report.processed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "bad.txt");
        assert!(matches!(report.failures[0].error, IndexError::Llm(_)));
        assert!(report.failures[0].to_string().starts_with("bad.txt: "));
        assert_eq!(report.unavailable_count(), 1);

        let bad: Vec<_> = index.entries_for("bad.txt").collect();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].hash, "old");
        assert_eq!(index.entries_for("good.txt").count(), 1);
    }

    #[tokio::test]
    async fn unreadable_file_is_reported() {
        let source = MemorySource::default();
        let embedder = MockEmbedder::default();
        let chunker = small_chunker();
        let updater = IndexUpdater::new(&chunker, &embedder, "embed", &source);
        let diff = ManifestDiff {
            added: vec![rec("gone.txt", "h")],
            ..ManifestDiff::default()
        };
        let mut index = VectorIndex::default();

        let report = updater.update(&mut index, &diff).await;

        assert_eq!(report.processed, 0);
        assert!(matches!(report.failures[0].error, IndexError::Io(_)));
        assert_eq!(report.failed_paths(), HashSet::from(["gone.txt"]));
        assert_eq!(report.unavailable_count(), 0);
    }

    #[tokio::test]
    async fn empty_file_is_not_an_error() {
        let source = MemorySource::default().with_file("empty.txt", "");
        let embedder = MockEmbedder::default();
        let chunker = small_chunker();
        let updater = IndexUpdater::new(&chunker, &embedder, "embed", &source);
        let diff = ManifestDiff {
            added: vec![rec("empty.txt", "h")],
            ..ManifestDiff::default()
        };
        let mut index = VectorIndex::default();

        let report = updater.update(&mut index, &diff).await;

        assert_eq!(report.processed, 1);
        assert_eq!(report.new_chunks, 0);
        assert!(report.failures.is_empty());
        assert_eq!(embedder.embedded_count(), 0);
    }

    #[tokio::test]
    async fn whitespace_only_file_is_not_embedded() {
        let source = MemorySource::default().with_file("blank.txt", "\n  \n\t\n");
        let embedder = MockEmbedder::default();
        let chunker = small_chunker();
        let updater = IndexUpdater::new(&chunker, &embedder, "embed", &source);
        let diff = ManifestDiff {
            added: vec![rec("blank.txt", "h")],
            ..ManifestDiff::default()
        };
        let mut index = VectorIndex::default();

        let report = updater.update(&mut index, &diff).await;

        assert_eq!(report.processed, 1);
        assert!(report.failures.is_empty());
        assert!(index.is_empty());
        assert_eq!(embedder.embedded_count(), 0);
    }

    #[tokio::test]
    async fn short_embedding_reply_fails_the_file() {
        let source = MemorySource::default().with_file("a.txt", "one\ntwo\nthree\nfour");
        let embedder = MockEmbedder::default().with_short_reply();
        let chunker = small_chunker();
        let updater = IndexUpdater::new(&chunker, &embedder, "embed", &source);
        let diff = ManifestDiff {
            added: vec![rec("a.txt", "h")],
            ..ManifestDiff::default()
        };
        let mut index = VectorIndex::default();

        let report = updater.update(&mut index, &diff).await;

        assert!(matches!(
            report.failures[0].error,
            IndexError::VectorCountMismatch { .. }
        ));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn removed_files_are_pruned_first() {
        let source = MemorySource::default().with_file("a.txt", "x");
        let embedder = MockEmbedder::default();
        let chunker = small_chunker();
        let updater = IndexUpdater::new(&chunker, &embedder, "embed", &source);

        let mut index = VectorIndex::default();
        let old = crate::chunker::Chunk {
            text: "old".into(),
            start_line: 0,
            end_line: 0,
        };
        index
            .upsert_file("old.txt", "h", &[old.clone(), old], vec![vec![1.0], vec![1.0]], Utc::now())
            .unwrap();

        let diff = ManifestDiff {
            added: vec![rec("a.txt", "ha")],
            removed: vec!["old.txt".into()],
            ..ManifestDiff::default()
        };
        let report = updater.update(&mut index, &diff).await;

        assert_eq!(report.removed_chunks, 2);
        assert_eq!(index.paths().into_iter().collect::<Vec<_>>(), vec!["a.txt"]);
    }
}
