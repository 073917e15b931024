//! Prompt rendering and code generation.

use super::{log_detail, Step};
use crate::context::{PipelineContext, LAST_CODE_GENERATED};
use crate::core::{StepKind, StepOutput, StepValue};
use crate::errors::Result;
use crate::prompts::Prompt;
use async_trait::async_trait;
use serde_json::json;

/// Renders the code-generation prompt from the context.
///
/// Direct SQL mode selects the SQL template. The input is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptGeneration;

impl PromptGeneration {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for PromptGeneration {
    fn kind(&self) -> StepKind {
        StepKind::PromptGeneration
    }

    async fn execute(&self, _input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let prompt = Prompt::generate_code(ctx);
        log_detail(ctx, self.kind(), "Using prompt", &prompt.text);

        let text = prompt.text.clone();
        Ok(
            StepOutput::ok(StepValue::Prompt(prompt), "Prompt Generated Successfully")
                .with_metadata("prompt", json!(text)),
        )
    }
}

/// Asks the LLM for code and records it as `last_code_generated`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeGenerator;

impl CodeGenerator {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for CodeGenerator {
    fn kind(&self) -> StepKind {
        StepKind::CodeGenerator
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let prompt = input.into_prompt()?;
        let code = ctx.llm().generate_code(&prompt, ctx).await?;

        ctx.add(LAST_CODE_GENERATED, json!(code));
        log_detail(ctx, self.kind(), "Code generated", &code);

        Ok(
            StepOutput::ok(StepValue::Code(code.clone()), "Code Generated Successfully")
                .with_metadata("code", json!(code)),
        )
    }
}
