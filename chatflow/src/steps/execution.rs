//! Code execution, result validation and result parsing.

use super::{log_detail, Step};
use crate::context::{PipelineContext, LAST_CODE_EXECUTED, LAST_RESULT};
use crate::core::{validate_output, ChatResult, StepKind, StepOutput, StepValue};
use crate::errors::{ChatflowError, Result};
use async_trait::async_trait;
use serde_json::json;

/// Runs code through the executor and checks the declared result type.
///
/// An unknown type tag, or a tag differing from the requested output type,
/// is an `InvalidOutputType` error so that correction can target it.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeExecution;

impl CodeExecution {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for CodeExecution {
    fn kind(&self) -> StepKind {
        StepKind::CodeExecution
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let code = input.into_code()?;
        ctx.add(LAST_CODE_EXECUTED, json!(code));

        let result = ctx.executor().execute(&code, ctx.data_sources()).await?;
        let expected = ctx.output_type();

        match (result.output_type(), expected) {
            (None, _) => {
                return Err(ChatflowError::InvalidOutputType {
                    expected: expected
                        .map_or_else(|| "number|string|dataframe|plot".to_string(), |t| t.to_string()),
                    actual: result.result_type,
                });
            }
            (Some(actual), Some(expected)) if actual != expected => {
                return Err(ChatflowError::InvalidOutputType {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
            _ => {}
        }

        let metadata = serde_json::to_value(&result)?;
        Ok(StepOutput::ok(StepValue::Result(result), "Code Executed Successfully")
            .with_metadata("result", metadata))
    }
}

/// Checks the result's value shape against the requested output type.
///
/// A mismatch is logged and reported through `success == false`; it never
/// fails the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultValidation;

impl ResultValidation {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for ResultValidation {
    fn kind(&self) -> StepKind {
        StepKind::ResultValidation
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let result = input.into_result()?;
        let (valid, logs) = validate_output(ctx.output_type(), &result);

        ctx.add(LAST_RESULT, serde_json::to_value(&result)?);
        log_detail(ctx, self.kind(), "Answer", &result.value.to_string());

        if valid {
            Ok(StepOutput::ok(StepValue::Result(result), "Output Validation Successful"))
        } else {
            tracing::warn!(step = %self.kind(), "{}", logs.join("\n"));
            Ok(StepOutput::unsuccessful(
                StepValue::Result(result),
                "Output Validation Failed",
            ))
        }
    }
}

/// Shapes the result into the public envelope and records the answer in
/// memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultParsing;

impl ResultParsing {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn memory_entry(response: &ChatResult) -> String {
        match response.result_type.as_str() {
            "dataframe" => "Check it out: <dataframe>".to_string(),
            "plot" => "Check it out: <plot>".to_string(),
            _ => response.to_text(),
        }
    }
}

#[async_trait]
impl Step for ResultParsing {
    fn kind(&self) -> StepKind {
        StepKind::ResultParsing
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let result = input.into_result()?;
        let code = ctx
            .intermediate()
            .get_str(LAST_CODE_EXECUTED)
            .unwrap_or_default();
        let response = ChatResult::new(result, code);

        {
            let mut memory = ctx.memory_mut();
            memory.add(Self::memory_entry(&response), false);
            memory.record_code(response.code.clone());
        }

        let metadata = serde_json::to_value(&response)?;
        Ok(
            StepOutput::ok(StepValue::Response(response), "Results parsed successfully")
                .with_metadata("response", metadata),
        )
    }
}
