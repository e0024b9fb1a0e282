//! Startup gate: the model service is reachable and has the models a command needs.

use anyhow::bail;
use askrepo_llm::ollama::OllamaClient;

use crate::config::Config;

/// Which command is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Indexing only needs the embedding model.
    Read,
    /// Answering needs both models.
    Ask,
}

#[must_use]
pub fn required_models<'a>(config: &'a Config, requirement: Requirement) -> Vec<&'a str> {
    match requirement {
        Requirement::Read => vec![config.llm.embedding_model.as_str()],
        Requirement::Ask => vec![
            config.llm.embedding_model.as_str(),
            config.llm.chat_model.as_str(),
        ],
    }
}

/// Abort unless the service answers and every required model is installed.
///
/// # Errors
///
/// Returns an error if the service is unreachable or any model is missing.
pub async fn check(client: &OllamaClient, models: &[&str]) -> anyhow::Result<()> {
    let missing = match client.missing_models(models).await {
        Ok(missing) => missing,
        Err(e) => bail!("model service at {} is unavailable: {e}", client.base_url()),
    };
    if !missing.is_empty() {
        let pulls: Vec<String> = missing.iter().map(|m| format!("ollama pull {m}")).collect();
        bail!(
            "required models not installed: {} (try: {})",
            missing.join(", "),
            pulls.join("; ")
        );
    }
    tracing::debug!(models = ?models, "preflight passed");
    Ok(())
}
