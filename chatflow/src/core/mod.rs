//! Core domain model types for chatflow.
//!
//! This module contains the values that flow between steps:
//! - Step kinds used for logging and tracker records
//! - Step outputs and the typed value passed from step to step
//! - Execution results, output types and the public reply envelope

mod output;
#[cfg(test)]
mod output_tests;
mod result;
mod status;

pub use output::{StepMetadata, StepOutput, StepValue};
pub use result::{validate_output, ChatReply, ChatResult, ExecutionResult, OutputType};
pub use status::StepKind;
