//! Inputs of the top-level pipelines and of error correction.

use crate::core::OutputType;
use crate::errors::ChatflowError;
use std::sync::Arc;
use uuid::Uuid;

/// A user query entering the chat pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPipelineInput {
    /// Natural-language question.
    pub query: String,
    /// Requested output type, if any.
    pub output_type: Option<OutputType>,
    /// Conversation this query belongs to.
    pub conversation_id: Uuid,
    /// Identifier of this prompt.
    pub prompt_id: Uuid,
}

impl ChatPipelineInput {
    /// Creates an input with a fresh prompt ID.
    #[must_use]
    pub fn new(query: impl Into<String>, conversation_id: Uuid) -> Self {
        Self {
            query: query.into(),
            output_type: None,
            conversation_id,
            prompt_id: Uuid::new_v4(),
        }
    }

    /// Requests an output type.
    #[must_use]
    pub const fn with_output_type(mut self, output_type: Option<OutputType>) -> Self {
        self.output_type = output_type;
        self
    }

    /// Sets the prompt ID.
    #[must_use]
    pub const fn with_prompt_id(mut self, prompt_id: Uuid) -> Self {
        self.prompt_id = prompt_id;
        self
    }
}

/// Caller-supplied code entering the execution pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExecutionPipelineInput {
    /// Code to run.
    pub code: String,
    /// Requested output type, if any.
    pub output_type: Option<OutputType>,
    /// Conversation this run belongs to.
    pub conversation_id: Uuid,
    /// Identifier of this prompt.
    pub prompt_id: Uuid,
}

impl CodeExecutionPipelineInput {
    /// Creates an input with a fresh prompt ID.
    #[must_use]
    pub fn new(code: impl Into<String>, conversation_id: Uuid) -> Self {
        Self {
            code: code.into(),
            output_type: None,
            conversation_id,
            prompt_id: Uuid::new_v4(),
        }
    }

    /// Requests an output type.
    #[must_use]
    pub const fn with_output_type(mut self, output_type: Option<OutputType>) -> Self {
        self.output_type = output_type;
        self
    }

    /// Sets the prompt ID.
    #[must_use]
    pub const fn with_prompt_id(mut self, prompt_id: Uuid) -> Self {
        self.prompt_id = prompt_id;
        self
    }
}

/// A failing code string together with the error it raised.
#[derive(Debug, Clone)]
pub struct ErrorCorrectionInput {
    /// The code that failed.
    pub code: String,
    /// Why it failed.
    pub error: Arc<ChatflowError>,
}

impl ErrorCorrectionInput {
    /// Creates a correction input.
    #[must_use]
    pub fn new(code: impl Into<String>, error: ChatflowError) -> Self {
        Self {
            code: code.into(),
            error: Arc::new(error),
        }
    }
}
