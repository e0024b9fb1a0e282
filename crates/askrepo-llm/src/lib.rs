//! Model-service boundary: text embeddings and chat completions.
//!
//! Business logic talks to the [`EmbeddingGateway`] and [`ChatModel`] traits;
//! [`ollama::OllamaClient`] implements both over Ollama's HTTP API.

pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod pacing;
pub mod provider;
pub(crate) mod retry;

pub use error::{FailureKind, LlmError, Result};
pub use pacing::PacingPolicy;
pub use provider::{ChatModel, EmbeddingGateway, Message, Role};
