//! Pipeline steps.
//!
//! A step receives the previous step's [`StepValue`] and the shared
//! [`PipelineContext`]. Steps communicate only through the context's
//! intermediate values; the engine decides skipping and recovery.

mod cache;
mod cleaning;
mod error_prompt;
mod execution;
mod generation;
mod validate_input;

pub use cache::{CacheLookup, CachePopulation};
pub use cleaning::{clean_code, CodeCleaning, WHITELISTED_LIBRARIES};
pub use error_prompt::ErrorPromptGeneration;
pub use execution::{CodeExecution, ResultParsing, ResultValidation};
pub use generation::{CodeGenerator, PromptGeneration};
pub use validate_input::ValidatePipelineInput;

use crate::context::PipelineContext;
use crate::core::{StepKind, StepOutput, StepValue};
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// A single pipeline stage.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Which step this is.
    fn kind(&self) -> StepKind;

    /// Runs the step.
    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput>;
}

/// Logs prompts and code at `info` in verbose mode, `debug` otherwise.
pub(crate) fn log_detail(ctx: &PipelineContext, step: StepKind, label: &str, text: &str) {
    if ctx.config().verbose {
        tracing::info!(step = %step, "{label}:\n{text}");
    } else {
        tracing::debug!(step = %step, "{label}:\n{text}");
    }
}
