//! The `read` and `ask` cycles.
//!
//! Both thread one [`VectorIndex`] value through scan → diff → update →
//! persist; nothing is held in ambient state between steps.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail, ensure};
use askrepo_index::chunker::Chunker;
use askrepo_index::manifest::{self, Manifest, ModelNames};
use askrepo_index::retriever::{ContextBlock, retrieve};
use askrepo_index::scanner::scan;
use askrepo_index::source::FsSource;
use askrepo_index::store::VectorIndex;
use askrepo_index::updater::{IndexUpdater, UpdateReport};
use askrepo_llm::{ChatModel, EmbeddingGateway, FailureKind, LlmError};

use crate::answer::AnswerComposer;
use crate::config::Config;

/// Where a repository's persisted state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub dir: PathBuf,
    pub manifest: PathBuf,
    pub index: PathBuf,
}

impl DataPaths {
    #[must_use]
    pub fn new(root: &Path, data_dir: &str) -> Self {
        let dir = root.join(data_dir);
        Self {
            manifest: dir.join("manifest.json"),
            index: dir.join("index.json"),
            dir,
        }
    }

    /// Delete the manifest and index, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn clear(&self) -> anyhow::Result<()> {
        for path in [&self.manifest, &self.index] {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::info!(path = %path.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to remove {}", path.display()));
                }
            }
        }
        Ok(())
    }
}

/// What one `read` cycle did.
#[derive(Debug, Default)]
pub struct ReadReport {
    pub scanned: usize,
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    /// The previous state was discarded because the embedding model changed.
    pub model_changed: bool,
    pub update: UpdateReport,
}

#[derive(Debug)]
pub struct ReadOutcome {
    pub report: ReadReport,
    pub index: VectorIndex,
}

/// Bring the persisted index in line with the files under `root`.
///
/// Per-file failures are reported, not returned: the affected files keep their
/// previous manifest record so the next cycle retries them.
///
/// # Errors
///
/// Returns an error if the scan patterns are invalid or state cannot be written.
pub async fn run_read<G: EmbeddingGateway>(
    config: &Config,
    root: &Path,
    force: bool,
    gateway: &G,
) -> anyhow::Result<ReadOutcome> {
    let paths = DataPaths::new(root, &config.index.data_dir);
    if force {
        paths.clear()?;
    }

    let embed_model = config.llm.embedding_model.as_str();
    let mut previous = Manifest::load(&paths.manifest);
    let mut index = VectorIndex::try_load(&paths.index).unwrap_or_else(|| {
        // Without the old vectors the manifest no longer describes what is indexed.
        if previous.take().is_some() {
            tracing::warn!("index missing or unreadable, re-indexing every file");
        }
        VectorIndex::default()
    });

    let mut model_changed = false;
    if let Some(prev) = &previous
        && !prev.models.embed.is_empty()
        && prev.models.embed != embed_model
    {
        tracing::warn!(
            previous = %prev.models.embed,
            current = embed_model,
            "embedding model changed, rebuilding index"
        );
        previous = None;
        index = VectorIndex::default();
        model_changed = true;
    }

    let scanned = scan(root, &config.index.scan_options()).context("failed to scan repository")?;

    let mut diff = manifest::diff(previous.as_ref(), &scanned.files);
    let present: BTreeSet<&str> = scanned.files.iter().map(|f| f.path.as_str()).collect();
    let orphans: Vec<String> = index
        .paths()
        .into_iter()
        .filter(|p| !present.contains(p))
        .map(str::to_owned)
        .collect();
    if !orphans.is_empty() {
        tracing::debug!(count = orphans.len(), "index holds files missing from scan");
    }
    diff.extend_removed(orphans);

    tracing::info!(
        files = scanned.files.len(),
        added = diff.added.len(),
        changed = diff.changed.len(),
        removed = diff.removed.len(),
        "diff computed"
    );

    let chunker = Chunker::new(config.chunker.into());
    let source = FsSource::new(root);
    let update = IndexUpdater::new(&chunker, gateway, embed_model, &source)
        .update(&mut index, &diff)
        .await;

    let mut next = Manifest::new(
        root,
        scanned,
        config.index.max_file_kb,
        ModelNames {
            embed: embed_model.to_owned(),
            chat: config.llm.chat_model.clone(),
        },
    );
    next.retain_previous_for(&update.failed_paths(), previous.as_ref());

    index
        .save(&paths.index)
        .with_context(|| format!("failed to write {}", paths.index.display()))?;
    next.save(&paths.manifest)
        .with_context(|| format!("failed to write {}", paths.manifest.display()))?;

    tracing::info!(
        processed = update.processed,
        chunks = update.new_chunks,
        failed = update.failures.len(),
        elapsed_ms = update.duration_ms,
        "read complete"
    );

    Ok(ReadOutcome {
        report: ReadReport {
            scanned: next.files_total,
            added: diff.added.len(),
            changed: diff.changed.len(),
            removed: diff.removed.len(),
            model_changed,
            update,
        },
        index,
    })
}

/// Per-invocation knobs for `ask`; `None` falls back to the config.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub question: String,
    /// Run a `read` cycle first.
    pub refresh: bool,
    pub top_k: Option<usize>,
    pub max_tokens: Option<u32>,
    pub chat_model: Option<String>,
}

#[derive(Debug)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ContextBlock>,
    /// Present when the index was refreshed first.
    pub refreshed: Option<ReadReport>,
}

impl Answer {
    #[must_use]
    pub fn citations(&self) -> Vec<String> {
        self.sources.iter().map(ContextBlock::citation).collect()
    }
}

/// Answer a question from the repository's indexed content.
///
/// # Errors
///
/// Returns an error if the index is empty, the question cannot be embedded, or the
/// chat call fails.
pub async fn run_ask<G, C>(
    config: &Config,
    root: &Path,
    options: &AskOptions,
    gateway: &G,
    chat: &C,
) -> anyhow::Result<Answer>
where
    G: EmbeddingGateway,
    C: ChatModel,
{
    let question = options.question.trim();
    if question.is_empty() {
        bail!("question must not be empty");
    }
    let k = options.top_k.unwrap_or(config.retrieval.top_k);
    ensure!(k > 0, "top_k must be at least 1");

    let (index, refreshed) = if options.refresh {
        let outcome = run_read(config, root, false, gateway).await?;
        (outcome.index, Some(outcome.report))
    } else {
        let paths = DataPaths::new(root, &config.index.data_dir);
        (VectorIndex::load(&paths.index), None)
    };

    if !index.chunks.iter().any(|e| e.vector.is_some()) {
        bail!("no vectors available, run `read` first");
    }

    let query = gateway
        .embed(&config.llm.embedding_model, &[question.to_owned()])
        .await
        .map_err(|e| service_error(e, "embedding the question"))?
        .into_iter()
        .next()
        .context("embedding service returned no vector for the question")?;

    let sources = retrieve(&index, &query, k, &FsSource::new(root));
    tracing::info!(k, retrieved = sources.len(), "context selected");

    let model = options.chat_model.as_deref().unwrap_or(&config.llm.chat_model);
    let max_tokens = options.max_tokens.unwrap_or(config.llm.max_tokens);
    let text = AnswerComposer::new(chat, model, Some(max_tokens))
        .answer(question, &sources)
        .await
        .map_err(|e| service_error(e, "generating the answer"))?;

    Ok(Answer {
        text,
        sources,
        refreshed,
    })
}

/// Wrap a model-service error with a message worded by how the call failed.
fn service_error(err: LlmError, action: &str) -> anyhow::Error {
    let msg = match err.kind() {
        FailureKind::ServiceUnavailable => format!("model service unavailable while {action}"),
        FailureKind::MalformedResponse => {
            format!("model service sent a malformed reply while {action}")
        }
        FailureKind::NonSuccess => format!("model service rejected the request while {action}"),
        FailureKind::Other => format!("model service call failed while {action}"),
    };
    anyhow::Error::new(err).context(msg)
}
