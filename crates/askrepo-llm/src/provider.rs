use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Turns texts into vectors.
pub trait EmbeddingGateway: Send + Sync {
    /// Embed every text with `model`, returning one vector per text in input order.
    ///
    /// # Errors
    ///
    /// Fails on the first text whose request is unreachable, rejected, or malformed;
    /// no partial result is returned.
    fn embed(
        &self,
        model: &str,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;
}

/// Produces an assistant reply for a conversation.
pub trait ChatModel: Send + Sync {
    /// Send `messages` to `model` and return the full reply text.
    ///
    /// `num_predict` caps the number of generated tokens when set.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or the reply cannot be parsed.
    fn chat(
        &self,
        model: &str,
        messages: &[Message],
        num_predict: Option<u32>,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;
}
