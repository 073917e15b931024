//! Sequential pipeline execution.

use super::{NoOpObserver, PipelineObserver, RetryPolicy, StepSpec};
use crate::context::{ErrorCorrectionInput, PipelineContext};
use crate::core::{StepKind, StepOutput, StepValue};
use crate::errors::{ChatflowError, Result};
use crate::tracker::{ExecutionTracker, TrackedStep};
use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Produces corrected code for a failing code string.
#[async_trait]
pub trait CodeCorrector: Send + Sync {
    /// Returns code meant to fix `input.error`.
    async fn correct(&self, input: ErrorCorrectionInput) -> Result<String>;
}

/// An ordered list of steps run against one shared context.
///
/// Steps run strictly in declaration order. A skipped step passes its input
/// through untouched. When a step fails with a retryable error, its
/// [`RetryPolicy`] decides whether the same step runs again, and every such
/// recovery draws from the context's retry budget.
pub struct Pipeline {
    name: String,
    steps: Vec<StepSpec>,
    context: Arc<PipelineContext>,
    tracker: Option<Arc<ExecutionTracker>>,
    observer: Arc<dyn PipelineObserver>,
    corrector: Option<Arc<dyn CodeCorrector>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("tracked", &self.tracker.is_some())
            .field("corrector", &self.corrector.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>, context: Arc<PipelineContext>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            context,
            tracker: None,
            observer: Arc::new(NoOpObserver),
            corrector: None,
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, spec: StepSpec) -> Self {
        self.steps.push(spec);
        self
    }

    /// Records every executed step in `tracker`.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ExecutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Sets the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the corrector used by [`RetryPolicy::ErrorCorrection`] steps.
    #[must_use]
    pub fn with_corrector(mut self, corrector: Arc<dyn CodeCorrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared context.
    #[must_use]
    pub const fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order and returns the last step's value.
    pub async fn run(&self, input: StepValue) -> Result<StepValue> {
        tracing::debug!(pipeline = %self.name, steps = self.steps.len(), "Running pipeline");
        let mut value = input;
        for spec in &self.steps {
            if spec.should_skip(&self.context) {
                tracing::debug!(pipeline = %self.name, step = %spec.runner.kind(), "Skipping step");
                continue;
            }
            value = self.run_step(spec, value).await?;
        }
        Ok(value)
    }

    async fn run_step(&self, spec: &StepSpec, mut input: StepValue) -> Result<StepValue> {
        let kind = spec.runner.kind();
        loop {
            if let Some(point) = spec.observe.filter(|point| point.is_before()) {
                point.notify(self.observer.as_ref(), &input);
            }

            let started = Instant::now();
            match spec.runner.execute(input.clone(), &self.context).await {
                Ok(output) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    tracing::debug!(
                        pipeline = %self.name,
                        step = %kind,
                        success = output.success,
                        "{}",
                        output.message
                    );
                    self.track(success_record(kind, &output, elapsed));
                    if let Some(point) = spec.observe.filter(|point| !point.is_before()) {
                        point.notify(self.observer.as_ref(), &output.value);
                    }
                    return Ok(output.value);
                }
                Err(error) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    let code = input
                        .as_code()
                        .map(str::to_string)
                        .or_else(|| self.context.last_code_generated())
                        .unwrap_or_default();
                    tracing::warn!(pipeline = %self.name, step = %kind, error = %error, "Step failed");
                    self.track(failure_record(kind, &code, &error, elapsed));
                    input = self.recover(spec, input, code, error).await?;
                }
            }
        }
    }

    /// Decides what the failed step runs on next, or gives up.
    async fn recover(
        &self,
        spec: &StepSpec,
        input: StepValue,
        code: String,
        error: ChatflowError,
    ) -> Result<StepValue> {
        if !error.is_retryable() {
            return Err(error);
        }
        let max_retries = self.context.config().max_retries;

        match spec.retry {
            RetryPolicy::Never => Err(error),
            RetryPolicy::Reattempt => {
                let Some(attempt) = self.context.retry_budget().try_acquire(max_retries) else {
                    return Err(error);
                };
                let delay = self.context.config().llm_backoff.delay_for(attempt - 1);
                tracing::info!(
                    step = %spec.runner.kind(),
                    attempt,
                    max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Re-attempting step"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(input)
            }
            RetryPolicy::ErrorCorrection => self.correct(code, error).await.map(StepValue::Code),
        }
    }

    async fn correct(&self, mut code: String, mut error: ChatflowError) -> Result<String> {
        let config = self.context.config();
        let corrector = match &self.corrector {
            Some(corrector) if config.use_error_correction_framework => corrector,
            _ => return Err(error),
        };

        loop {
            let Some(attempt) = self.context.retry_budget().try_acquire(config.max_retries) else {
                tracing::warn!(max_retries = config.max_retries, "Retry budget exhausted");
                return Err(error);
            };
            tracing::info!(
                attempt,
                max_retries = config.max_retries,
                error = %error,
                "Correcting failed code"
            );

            match corrector.correct(ErrorCorrectionInput::new(code.clone(), error)).await {
                Ok(corrected) => return Ok(corrected),
                Err(next) if !next.is_retryable() => return Err(next),
                Err(next) => {
                    if let Some(latest) = self.context.last_code_generated() {
                        code = latest;
                    }
                    error = next;
                }
            }
        }
    }

    fn track(&self, step: TrackedStep) {
        if let Some(tracker) = &self.tracker {
            tracker.add_step(step);
        }
    }
}

fn success_record(kind: StepKind, output: &StepOutput, elapsed: f64) -> TrackedStep {
    let record = TrackedStep::new(kind.as_str(), output.success, output.message.clone())
        .with_execution_time(elapsed);
    match output.metadata.as_ref().and_then(|m| serde_json::to_value(m).ok()) {
        Some(data) => record.with_data(data),
        None => record,
    }
}

fn failure_record(kind: StepKind, code: &str, error: &ChatflowError, elapsed: f64) -> TrackedStep {
    let message = match kind {
        StepKind::CodeExecution => "Failed to execute code",
        StepKind::CodeCleaning => "Failed to clean code",
        _ => "Step failed",
    };
    TrackedStep::new(kind.as_str(), false, message)
        .with_execution_time(elapsed)
        .with_data(json!({
            "content_type": "code",
            "value": code,
            "exception": error.to_string(),
        }))
}
