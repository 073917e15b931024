//! Correction prompt selection.

use super::{log_detail, Step};
use crate::context::PipelineContext;
use crate::core::{StepKind, StepOutput, StepValue};
use crate::errors::Result;
use crate::prompts::Prompt;
use async_trait::async_trait;
use serde_json::json;

/// Renders the correction prompt matching the failing error's kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorPromptGeneration;

impl ErrorPromptGeneration {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for ErrorPromptGeneration {
    fn kind(&self) -> StepKind {
        StepKind::ErrorPromptGeneration
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let correction = input.into_correction()?;
        let prompt = Prompt::correction(
            ctx,
            correction.error.kind(),
            &correction.code,
            &correction.error.report(),
        );
        log_detail(ctx, self.kind(), "Using prompt", &prompt.text);

        let metadata = json!(prompt.text);
        Ok(
            StepOutput::ok(StepValue::Prompt(prompt), "Prompt Generated Successfully")
                .with_metadata("prompt", metadata),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ErrorCorrectionInput;
    use crate::errors::ChatflowError;
    use crate::prompts::PromptKind;
    use crate::testing::{ScriptedExecutor, ScriptedLlm};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_prompt_follows_error_kind() {
        let ctx = PipelineContext::builder(
            Arc::new(ScriptedLlm::new()),
            Arc::new(ScriptedExecutor::new()),
        )
        .build();

        let cases = [
            (
                ChatflowError::InvalidOutputType {
                    expected: "number".into(),
                    actual: "string".into(),
                },
                PromptKind::CorrectOutputTypeError,
            ),
            (
                ChatflowError::ExecuteSqlQueryNotUsed,
                PromptKind::CorrectExecuteSqlQueryUsageError,
            ),
            (ChatflowError::execution("boom"), PromptKind::CorrectError),
        ];

        for (error, expected) in cases {
            let input = StepValue::Correction(ErrorCorrectionInput::new("x = 1", error));
            let output = ErrorPromptGeneration.execute(input, &ctx).await.unwrap();
            let prompt = output.value.into_prompt().unwrap();
            assert_eq!(prompt.kind, expected);
            assert!(prompt.text.contains("x = 1"));
        }
    }
}
