//! Step specifications.

use super::{ObservePoint, RetryPolicy};
use crate::context::PipelineContext;
use crate::steps::Step;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a step is skipped.
pub type SkipPredicate = Arc<dyn Fn(&PipelineContext) -> bool + Send + Sync>;

/// A step plus how the engine treats it.
#[derive(Clone)]
pub struct StepSpec {
    /// The step implementation.
    pub runner: Arc<dyn Step>,
    /// Skip the step when this returns true.
    pub skip_if: Option<SkipPredicate>,
    /// Recovery on retryable errors.
    pub retry: RetryPolicy,
    /// Observer callback fired around the step.
    pub observe: Option<ObservePoint>,
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("step", &self.runner.kind())
            .field("conditional", &self.skip_if.is_some())
            .field("retry", &self.retry)
            .field("observe", &self.observe)
            .finish()
    }
}

impl StepSpec {
    /// Creates a specification that always runs and never retries.
    #[must_use]
    pub fn new(runner: Arc<dyn Step>) -> Self {
        Self {
            runner,
            skip_if: None,
            retry: RetryPolicy::Never,
            observe: None,
        }
    }

    /// Skips the step when `predicate` holds.
    #[must_use]
    pub fn skip_if(
        mut self,
        predicate: impl Fn(&PipelineContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip_if = Some(Arc::new(predicate));
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reports the step to the observer.
    #[must_use]
    pub const fn observe(mut self, point: ObservePoint) -> Self {
        self.observe = Some(point);
        self
    }

    /// Evaluates the skip predicate.
    #[must_use]
    pub fn should_skip(&self, ctx: &PipelineContext) -> bool {
        self.skip_if.as_ref().is_some_and(|predicate| predicate(ctx))
    }
}
