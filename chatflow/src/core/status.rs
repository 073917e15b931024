//! Step kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a pipeline step.
///
/// The string form is used as the step type in tracker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Rejects incompatible data-source setups.
    ValidatePipelineInput,
    /// Short-circuits generation on a cache hit.
    CacheLookup,
    /// Renders the code-generation prompt.
    PromptGeneration,
    /// Calls the LLM for code.
    CodeGenerator,
    /// Stores freshly generated code in the cache.
    CachePopulation,
    /// Extracts and screens generated code.
    CodeCleaning,
    /// Runs code against the data sources.
    CodeExecution,
    /// Checks the result against the requested output type.
    ResultValidation,
    /// Shapes the result into the public envelope.
    ResultParsing,
    /// Renders an error-specific correction prompt.
    ErrorPromptGeneration,
}

impl StepKind {
    /// Returns the step name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidatePipelineInput => "ValidatePipelineInput",
            Self::CacheLookup => "CacheLookup",
            Self::PromptGeneration => "PromptGeneration",
            Self::CodeGenerator => "CodeGenerator",
            Self::CachePopulation => "CachePopulation",
            Self::CodeCleaning => "CodeCleaning",
            Self::CodeExecution => "CodeExecution",
            Self::ResultValidation => "ResultValidation",
            Self::ResultParsing => "ResultParsing",
            Self::ErrorPromptGeneration => "ErrorPromptGeneration",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
