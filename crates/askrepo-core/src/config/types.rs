use std::time::Duration;

use askrepo_index::chunker::ChunkerConfig;
use askrepo_index::scanner::ScanOptions;
use askrepo_llm::PacingPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunker: ChunkerSection,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_chat_model() -> String {
    "llama3.1:8b".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Upper bound on generated tokens per answer (`num_predict`).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub(crate) fn default_exclude() -> Vec<String> {
    [
        ".git/",
        "node_modules/",
        "target/",
        "dist/",
        "build/",
        "vendor/",
        "__pycache__/",
        ".venv/",
        "*.lock",
        "package-lock.json",
        "*.min.js",
        "*.min.css",
        "*.map",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_file_kb() -> u64 {
    256
}

fn default_respect_gitignore() -> bool {
    true
}

fn default_data_dir() -> String {
    ".askrepo".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Globs a file must match to be indexed; empty admits every file.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_max_file_kb")]
    pub max_file_kb: u64,
    #[serde(default = "default_respect_gitignore")]
    pub respect_gitignore: bool,
    /// Directory under the repository root holding the manifest and index.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: default_exclude(),
            max_file_kb: default_max_file_kb(),
            respect_gitignore: default_respect_gitignore(),
            data_dir: default_data_dir(),
        }
    }
}

impl IndexConfig {
    /// Scanner options, with the data directory always excluded.
    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        let mut exclude = self.exclude.clone();
        let data_dir = self.data_dir.trim_matches('/');
        if !data_dir.is_empty() {
            exclude.push(format!("/{data_dir}/"));
        }
        ScanOptions {
            include: self.include.clone(),
            exclude,
            max_file_kb: self.max_file_kb,
            respect_gitignore: self.respect_gitignore,
        }
    }
}

fn default_max_chars() -> usize {
    1500
}

fn default_overlap_chars() -> usize {
    200
}

fn default_max_overlap_lines() -> usize {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkerSection {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    #[serde(default = "default_max_overlap_lines")]
    pub max_overlap_lines: usize,
}

impl Default for ChunkerSection {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            max_overlap_lines: default_max_overlap_lines(),
        }
    }
}

impl From<ChunkerSection> for ChunkerConfig {
    fn from(section: ChunkerSection) -> Self {
        Self {
            max_chars: section.max_chars,
            overlap_chars: section.overlap_chars,
            max_overlap_lines: section.max_overlap_lines,
        }
    }
}

fn default_batch_size() -> usize {
    16
}

fn default_call_delay_ms() -> u64 {
    25
}

fn default_batch_delay_ms() -> u64 {
    200
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_call_delay_ms")]
    pub call_delay_ms: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Retries per request after HTTP 429.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            call_delay_ms: default_call_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    #[must_use]
    pub fn pacing(&self) -> PacingPolicy {
        PacingPolicy {
            max_batch_size: self.batch_size,
            call_delay: Duration::from_millis(self.call_delay_ms),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

fn default_top_k() -> usize {
    6
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}
