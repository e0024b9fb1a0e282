//! Prompt assembly and the chat call that turns retrieved context into an answer.

use std::fmt::Write;

use askrepo_index::retriever::ContextBlock;
use askrepo_llm::{ChatModel, LlmError, Message};

pub const SYSTEM_PROMPT: &str = "You answer questions about a source code repository. \
Use only the context blocks provided. Each block starts with a citation in the form \
[path:start-end]; cite the blocks you rely on using exactly that form. \
If the context does not contain the answer, say so instead of guessing.";

/// Render blocks under their citation headers, in retrieval order.
#[must_use]
pub fn format_context(blocks: &[ContextBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        let _ = writeln!(out, "[{}]", block.citation());
        if block.text.is_empty() {
            out.push_str("(content unavailable)\n\n");
        } else {
            let _ = writeln!(out, "```\n{}\n```\n", block.text);
        }
    }
    out
}

/// System + user message pair for `question` over `blocks`.
#[must_use]
pub fn build_messages(question: &str, blocks: &[ContextBlock]) -> Vec<Message> {
    let user = format!(
        "Context:\n\n{}Question: {}",
        format_context(blocks),
        question.trim()
    );
    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

pub struct AnswerComposer<'a, C> {
    chat: &'a C,
    model: &'a str,
    max_tokens: Option<u32>,
}

impl<'a, C: ChatModel> AnswerComposer<'a, C> {
    #[must_use]
    pub fn new(chat: &'a C, model: &'a str, max_tokens: Option<u32>) -> Self {
        Self {
            chat,
            model,
            max_tokens,
        }
    }

    /// # Errors
    ///
    /// Returns the chat model's error unchanged.
    pub async fn answer(&self, question: &str, blocks: &[ContextBlock]) -> Result<String, LlmError> {
        let messages = build_messages(question, blocks);
        tracing::debug!(model = self.model, blocks = blocks.len(), "composing answer");
        let reply = self.chat.chat(self.model, &messages, self.max_tokens).await?;
        Ok(reply.trim().to_owned())
    }
}
