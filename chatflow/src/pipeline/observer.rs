//! Observer interface for the embedding application.

use crate::core::{ChatResult, StepValue};
use crate::prompts::Prompt;

/// Callbacks fired synchronously at fixed points of a run.
///
/// All methods default to no-ops. Implementations must return quickly since
/// the run waits for them.
pub trait PipelineObserver: Send + Sync {
    /// A prompt was rendered.
    fn on_prompt_generated(&self, _prompt: &Prompt) {}

    /// Code was generated.
    fn on_code_generated(&self, _code: &str) {}

    /// Code is about to run.
    fn before_code_execution(&self, _code: &str) {}

    /// A result was parsed.
    fn on_result(&self, _result: &ChatResult) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl PipelineObserver for NoOpObserver {}

/// Where a step reports to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservePoint {
    /// After the step, with the prompt it produced.
    PromptGenerated,
    /// After the step, with the code it produced.
    CodeGenerated,
    /// Before the step, with the code it receives.
    CodeAboutToRun,
    /// After the step, with the result it produced.
    ResultReady,
}

impl ObservePoint {
    /// Whether the observer sees the step input rather than its output.
    #[must_use]
    pub const fn is_before(self) -> bool {
        matches!(self, Self::CodeAboutToRun)
    }

    /// Forwards `value` to the matching observer method. Mismatched values
    /// are ignored.
    pub fn notify(self, observer: &dyn PipelineObserver, value: &StepValue) {
        match (self, value) {
            (Self::PromptGenerated, StepValue::Prompt(prompt)) => {
                observer.on_prompt_generated(prompt);
            }
            (Self::CodeGenerated, StepValue::Code(code)) => observer.on_code_generated(code),
            (Self::CodeAboutToRun, StepValue::Code(code)) => observer.before_code_execution(code),
            (Self::ResultReady, StepValue::Response(result)) => observer.on_result(result),
            _ => {}
        }
    }
}
