//! Test-only deterministic model service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{ChatModel, EmbeddingGateway, Message};

/// Embeds text as a byte histogram folded into `dims` buckets.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dims: usize,
    /// Any text containing one of these markers fails with `Unavailable`.
    pub fail_markers: Vec<String>,
    /// Return one vector fewer than requested.
    pub short_reply: bool,
    embedded: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dims: 16,
            fail_markers: Vec::new(),
            short_reply: false,
            embedded: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_markers: vec![marker.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_short_reply(mut self) -> Self {
        self.short_reply = true;
        self
    }

    /// Total number of texts embedded successfully so far.
    #[must_use]
    pub fn embedded_count(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let dims = self.dims.max(1);
        let mut v = vec![0.0f32; dims];
        for b in text.bytes() {
            v[usize::from(b) % dims] += 1.0;
        }
        v[0] += 1.0;
        v
    }
}

impl EmbeddingGateway for MockEmbedder {
    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if let Some(marker) = self
            .fail_markers
            .iter()
            .find(|m| texts.iter().any(|t| t.contains(m.as_str())))
        {
            return Err(LlmError::Unavailable {
                url: "mock://embeddings".into(),
                reason: format!("text contains failure marker {marker:?}"),
            });
        }
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.vector_for(t)).collect();
        if self.short_reply {
            vectors.pop();
        }
        self.embedded.fetch_add(vectors.len(), Ordering::SeqCst);
        Ok(vectors)
    }
}

/// Replays canned chat replies and records the conversations it received.
#[derive(Debug, Clone, Default)]
pub struct MockChat {
    responses: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<Vec<Message>>>>,
    pub fail: bool,
}

impl MockChat {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Conversations received so far, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().unwrap().clone()
    }
}

impl ChatModel for MockChat {
    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _num_predict: Option<u32>,
    ) -> Result<String, LlmError> {
        if self.fail {
            return Err(LlmError::Other("mock chat error".into()));
        }
        self.received.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("mock answer".into())
        } else {
            Ok(responses.remove(0))
        }
    }
}
