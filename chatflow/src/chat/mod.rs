//! Query-to-answer orchestration.
//!
//! [`GenerateChatPipeline`] wires the steps into code generation and code
//! execution pipelines, with [`ErrorCorrectionPipeline`] as the recovery path
//! and an optional [`Judge`] gate in between.

mod error_correction;
mod generate_chat;
mod judge;
mod registry;


pub use error_correction::ErrorCorrectionPipeline;
pub use generate_chat::{
    format_error_reply, GenerateChatPipeline, GenerateChatPipelineBuilder, ERROR_PREAMBLE,
};
#[cfg(test)]
pub use judge::MockJudge;
pub use judge::Judge;
pub use registry::{
    BuiltPipeline, PipelineConstructor, PipelineKind, PipelineParts, PipelineRegistry,
};
