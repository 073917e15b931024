//! Step outputs and the values passed between steps.

use super::{ChatResult, ExecutionResult};
use crate::context::{ChatPipelineInput, ErrorCorrectionInput};
use crate::errors::{ChatflowError, Result};
use crate::prompts::Prompt;
use serde::{Deserialize, Serialize};

/// The value handed from one step to the next.
#[derive(Debug, Clone, Default)]
pub enum StepValue {
    /// No value.
    #[default]
    Empty,
    /// A user query entering the code-generation pipeline.
    Query(ChatPipelineInput),
    /// A rendered prompt.
    Prompt(Prompt),
    /// Generated or caller-supplied code.
    Code(String),
    /// A failing code string with its error.
    Correction(ErrorCorrectionInput),
    /// The raw result of executing code.
    Result(ExecutionResult),
    /// The parsed public result.
    Response(ChatResult),
}

impl StepValue {
    /// Returns the variant name, for diagnostics.
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Query(_) => "query",
            Self::Prompt(_) => "prompt",
            Self::Code(_) => "code",
            Self::Correction(_) => "correction",
            Self::Result(_) => "result",
            Self::Response(_) => "response",
        }
    }

    /// Borrows the code, if this is a code value.
    #[must_use]
    pub fn as_code(&self) -> Option<&str> {
        match self {
            Self::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Takes the code out of the value.
    ///
    /// # Errors
    ///
    /// Returns an internal error for any other variant.
    pub fn into_code(self) -> Result<String> {
        match self {
            Self::Code(code) => Ok(code),
            other => Err(other.unexpected("code")),
        }
    }

    /// Takes the prompt out of the value.
    pub fn into_prompt(self) -> Result<Prompt> {
        match self {
            Self::Prompt(prompt) => Ok(prompt),
            other => Err(other.unexpected("prompt")),
        }
    }

    /// Takes the execution result out of the value.
    pub fn into_result(self) -> Result<ExecutionResult> {
        match self {
            Self::Result(result) => Ok(result),
            other => Err(other.unexpected("result")),
        }
    }

    /// Takes the correction input out of the value.
    pub fn into_correction(self) -> Result<ErrorCorrectionInput> {
        match self {
            Self::Correction(input) => Ok(input),
            other => Err(other.unexpected("correction")),
        }
    }

    /// Takes the parsed response out of the value.
    pub fn into_response(self) -> Result<ChatResult> {
        match self {
            Self::Response(response) => Ok(response),
            other => Err(other.unexpected("response")),
        }
    }

    fn unexpected(&self, expected: &str) -> ChatflowError {
        ChatflowError::internal(format!(
            "expected a {expected} value, got {}",
            self.variant_name()
        ))
    }
}

/// Typed payload attached to a step output and copied into tracker records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
    /// What the payload holds (`prompt`, `code`, `response`, ...).
    pub content_type: String,
    /// The payload.
    pub value: serde_json::Value,
}

impl StepMetadata {
    /// Creates step metadata.
    #[must_use]
    pub fn new(content_type: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            content_type: content_type.into(),
            value,
        }
    }
}

/// The output of one step execution.
///
/// `success == false` is informational. Only a returned `Err` makes the
/// pipeline consider recovery.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// The value passed to the next step.
    pub value: StepValue,
    /// Whether the step considers its own work successful.
    pub success: bool,
    /// Short human-readable outcome.
    pub message: String,
    /// Optional typed payload for tracking.
    pub metadata: Option<StepMetadata>,
}

impl StepOutput {
    /// Creates a successful output.
    #[must_use]
    pub fn ok(value: StepValue, message: impl Into<String>) -> Self {
        Self {
            value,
            success: true,
            message: message.into(),
            metadata: None,
        }
    }

    /// Creates an unsuccessful, non-fatal output.
    #[must_use]
    pub fn unsuccessful(value: StepValue, message: impl Into<String>) -> Self {
        Self {
            value,
            success: false,
            message: message.into(),
            metadata: None,
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, content_type: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata = Some(StepMetadata::new(content_type, value));
        self
    }

    /// Converts to a dictionary representation, without the value.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "success": self.success,
            "message": self.message,
            "metadata": self.metadata,
        })
    }
}
