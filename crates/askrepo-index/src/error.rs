//! Error types for askrepo-index.

use askrepo_llm::FailureKind;

/// Errors that can occur while scanning, indexing, or persisting.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files or writing persisted state.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding service error.
    #[error("embedding failed: {0}")]
    Llm(#[from] askrepo_llm::LlmError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid include/exclude pattern.
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] ignore::Error),

    /// Embedding reply did not carry one vector per chunk.
    #[error("expected {expected} vectors, got {actual}")]
    VectorCountMismatch { expected: usize, actual: usize },

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

impl IndexError {
    /// How the model service failed, when it was the service that failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Llm(e) => Some(e.kind()),
            Self::VectorCountMismatch { .. } => Some(FailureKind::MalformedResponse),
            Self::Io(_) | Self::Json(_) | Self::Glob(_) | Self::Other(_) => None,
        }
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
