use std::time::Duration;

use ollama_rs::Ollama;
use serde::Serialize;
use serde_json::Value;

use crate::error::{LlmError, Result};
use crate::http::build_client;
use crate::pacing::PacingPolicy;
use crate::provider::{ChatModel, EmbeddingGateway, Message};
use crate::retry::send_with_retry;

const EMBEDDINGS_ENDPOINT: &str = "embeddings";
const CHAT_ENDPOINT: &str = "chat";
const DEFAULT_PORT: u16 = 11434;
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
}

/// Ollama HTTP client for embeddings, chat, and model listing.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    admin: Ollama,
    base_url: String,
    pacing: PacingPolicy,
    max_retries: u32,
}

impl OllamaClient {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an `http(s)` URL or the HTTP client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let (host, port) = split_host_port(&base_url)?;
        Ok(Self {
            http: build_client(request_timeout)?,
            admin: Ollama::new(host, port),
            base_url,
            pacing: PacingPolicy::default(),
            max_retries: 2,
        })
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models installed on the server (`/api/tags`).
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Unavailable` if the server cannot be queried.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let models = self
            .admin
            .list_local_models()
            .await
            .map_err(|e| LlmError::Unavailable {
                url: self.base_url.clone(),
                reason: format!("failed to list models, is Ollama running? {e}"),
            })?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }

    /// Subset of `required` that is not installed on the server.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Unavailable` if the server cannot be queried.
    pub async fn missing_models(&self, required: &[&str]) -> Result<Vec<String>> {
        let installed = self.list_models().await?;
        Ok(required
            .iter()
            .filter(|want| !installed.iter().any(|have| model_matches(have, want)))
            .map(|want| (*want).to_owned())
            .collect())
    }

    async fn embed_one(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model,
            prompt: text,
        };

        let response = send_with_retry(&url, self.max_retries, || {
            self.http.post(&url).json(&body).send()
        })
        .await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_send(&url, e))?;

        if !status.is_success() {
            tracing::error!("Ollama embedding error {status}: {text}");
            return Err(status_error(EMBEDDINGS_ENDPOINT, status, text));
        }

        parse_embedding(&text)
    }
}

impl EmbeddingGateway for OllamaClient {
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let delay = self.pacing.delay_before(i);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            vectors.push(self.embed_one(model, text).await?);
        }
        tracing::debug!(
            model,
            count = vectors.len(),
            batches = self.pacing.batch_count(texts.len()),
            "embedded texts"
        );
        Ok(vectors)
    }
}

impl ChatModel for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        num_predict: Option<u32>,
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            messages,
            options: num_predict.map(|num_predict| ChatOptions { num_predict }),
        };

        let response = send_with_retry(&url, self.max_retries, || {
            self.http.post(&url).json(&body).send()
        })
        .await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::from_send(&url, e))?;

        if !status.is_success() {
            tracing::error!("Ollama chat error {status}: {text}");
            return Err(status_error(CHAT_ENDPOINT, status, text));
        }

        parse_chat_body(&text)
    }
}

fn status_error(endpoint: &'static str, status: reqwest::StatusCode, mut body: String) -> LlmError {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    LlmError::Status {
        endpoint,
        status: status.as_u16(),
        body,
    }
}

fn malformed(endpoint: &'static str, reason: impl Into<String>) -> LlmError {
    LlmError::Malformed {
        endpoint,
        reason: reason.into(),
    }
}

/// Extract the `embedding` array from an `/api/embeddings` reply.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn parse_embedding(body: &str) -> Result<Vec<f32>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| malformed(EMBEDDINGS_ENDPOINT, format!("invalid JSON: {e}")))?;
    let Some(field) = value.get("embedding") else {
        return Err(malformed(EMBEDDINGS_ENDPOINT, "missing `embedding` field"));
    };
    let Some(items) = field.as_array() else {
        return Err(malformed(EMBEDDINGS_ENDPOINT, "`embedding` is not an array"));
    };
    if items.is_empty() {
        return Err(malformed(EMBEDDINGS_ENDPOINT, "`embedding` is empty"));
    }
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| malformed(EMBEDDINGS_ENDPOINT, "non-numeric vector component"))
        })
        .collect()
}

/// Concatenate `message.content` across a chat reply.
///
/// The body is either one JSON object or newline-delimited JSON fragments;
/// fragments are joined in the order they arrived.
pub(crate) fn parse_chat_body(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(malformed(CHAT_ENDPOINT, "empty body"));
    }

    let fragments: Vec<Value> = match serde_json::from_str::<Value>(trimmed) {
        Ok(single) => vec![single],
        Err(_) => trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| malformed(CHAT_ENDPOINT, format!("invalid fragment: {e}")))
            })
            .collect::<Result<_>>()?,
    };

    let mut answer = String::new();
    let mut saw_content = false;
    for fragment in &fragments {
        if let Some(err) = fragment.get("error").and_then(Value::as_str) {
            return Err(LlmError::Remote(err.to_owned()));
        }
        if let Some(content) = fragment.pointer("/message/content").and_then(Value::as_str) {
            answer.push_str(content);
            saw_content = true;
        }
    }

    if saw_content {
        Ok(answer)
    } else {
        Err(malformed(CHAT_ENDPOINT, "no `message.content` in reply"))
    }
}

/// `nomic-embed-text` is satisfied by `nomic-embed-text:latest`.
fn model_matches(installed: &str, required: &str) -> bool {
    installed == required
        || (!required.contains(':') && installed.strip_suffix(":latest") == Some(required))
}

fn split_host_port(base_url: &str) -> Result<(String, u16)> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| LlmError::Other(format!("invalid base URL {base_url:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LlmError::Other(format!(
            "unsupported scheme in base URL {base_url:?}"
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| LlmError::Other(format!("base URL {base_url:?} has no host")))?;
    let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
    Ok((format!("{}://{host}", url.scheme()), port))
}
