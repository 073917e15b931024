//! LLM collaborator interface.

use crate::context::PipelineContext;
use crate::errors::{ChatflowError, Result};
use crate::prompts::Prompt;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// A language model the engine can ask for text or code.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short identifier of the model or provider.
    fn kind(&self) -> &str;

    /// Completes `prompt` and returns the raw answer.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Generates code for `prompt`.
    ///
    /// The default completes the prompt and extracts the first fenced code
    /// block from the answer.
    async fn generate_code(&self, prompt: &Prompt, ctx: &PipelineContext) -> Result<String> {
        let _ = ctx;
        let answer = self.complete(prompt).await?;
        extract_code(&answer)
    }

    /// The last prompt sent, if the client keeps it.
    fn last_prompt(&self) -> Option<String> {
        None
    }
}

static FENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:[A-Za-z0-9_+-]+)?[ \t]*\r?\n(.*?)```").ok()
});

/// Extracts code from an LLM answer.
///
/// Takes the body of the first fenced block when there is one, the whole
/// answer otherwise.
///
/// # Errors
///
/// Returns `NoCodeFound` when nothing but whitespace remains.
pub fn extract_code(answer: &str) -> Result<String> {
    let code = FENCE
        .as_ref()
        .and_then(|fence| fence.captures(answer))
        .and_then(|c| c.get(1))
        .map_or(answer, |m| m.as_str())
        .trim();

    if code.is_empty() {
        return Err(ChatflowError::NoCodeFound(answer.trim().to_string()));
    }
    Ok(code.to_string())
}
