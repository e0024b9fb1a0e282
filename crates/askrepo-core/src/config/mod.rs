mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};

/// File looked up in the repository root when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "askrepo.toml";

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the workflows cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.llm.embedding_model.trim().is_empty(),
            "llm.embedding_model must not be empty"
        );
        ensure!(
            !self.llm.chat_model.trim().is_empty(),
            "llm.chat_model must not be empty"
        );
        ensure!(self.chunker.max_chars > 0, "chunker.max_chars must be > 0");
        ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be > 0"
        );
        ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be > 0");
        ensure!(
            !self.index.data_dir.trim().is_empty(),
            "index.data_dir must not be empty"
        );
        Ok(())
    }
}

/// Priority: `explicit` (`--config`) > `ASKREPO_CONFIG` env > `<root>/askrepo.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>, root: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("ASKREPO_CONFIG")
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    root.join(DEFAULT_CONFIG_FILE)
}
