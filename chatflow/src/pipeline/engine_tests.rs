//! Engine behavior: ordering, skipping, recovery and tracking.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::{ErrorCorrectionInput, PipelineContext};
    use crate::core::{StepKind, StepOutput, StepValue};
    use crate::errors::{ChatflowError, ErrorKind, LlmError, Result};
    use crate::pipeline::{
        BackoffConfig, CodeCorrector, ObservePoint, Pipeline, RetryPolicy, StepSpec,
    };
    use crate::steps::Step;
    use crate::testing::{ObservedEvent, RecordingObserver, ScriptedExecutor, ScriptedLlm};
    use crate::tracker::ExecutionTracker;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    /// Fails with a fresh error `failures` times, then echoes its input.
    #[derive(Debug)]
    struct FlakyStep {
        kind: StepKind,
        failures: Mutex<usize>,
        error: fn() -> ChatflowError,
        inputs: Mutex<Vec<String>>,
    }

    impl FlakyStep {
        fn new(kind: StepKind, failures: usize, error: fn() -> ChatflowError) -> Arc<Self> {
            Arc::new(Self {
                kind,
                failures: Mutex::new(failures),
                error,
                inputs: Mutex::new(Vec::new()),
            })
        }

        fn echo(kind: StepKind) -> Arc<Self> {
            Self::new(kind, 0, || ChatflowError::execution("unused"))
        }

        fn inputs(&self) -> Vec<String> {
            self.inputs.lock().clone()
        }
    }

    #[async_trait]
    impl Step for FlakyStep {
        fn kind(&self) -> StepKind {
            self.kind
        }

        async fn execute(&self, input: StepValue, _ctx: &PipelineContext) -> Result<StepOutput> {
            self.inputs
                .lock()
                .push(input.as_code().unwrap_or(input.variant_name()).to_string());
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err((self.error)());
                }
            }
            Ok(StepOutput::ok(input, "ok").with_metadata("code", json!("meta")))
        }
    }

    /// Returns `fixed_N` for the N-th correction.
    #[derive(Default)]
    struct CountingCorrector {
        seen: Mutex<Vec<(String, ErrorKind)>>,
        fail_first: Mutex<usize>,
    }

    impl CountingCorrector {
        fn calls(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl CodeCorrector for CountingCorrector {
        async fn correct(&self, input: ErrorCorrectionInput) -> Result<String> {
            let n = {
                let mut seen = self.seen.lock();
                seen.push((input.code.clone(), input.error.kind()));
                seen.len()
            };
            {
                let mut fail_first = self.fail_first.lock();
                if *fail_first > 0 {
                    *fail_first -= 1;
                    return Err(ChatflowError::NoCodeFound("no code".into()));
                }
            }
            Ok(format!("fixed_{n}"))
        }
    }

    fn context(config: Config) -> Arc<PipelineContext> {
        Arc::new(
            PipelineContext::builder(Arc::new(ScriptedLlm::new()), Arc::new(ScriptedExecutor::new()))
                .config(config.with_llm_backoff(BackoffConfig::immediate()))
                .build(),
        )
    }

    fn execution_error() -> ChatflowError {
        ChatflowError::execution("KeyError: 'revenue'")
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_skips_pass_through() {
        let ctx = context(Config::default());
        let tracker = Arc::new(ExecutionTracker::new());
        let first = FlakyStep::echo(StepKind::CodeCleaning);
        let skipped = FlakyStep::echo(StepKind::PromptGeneration);
        let last = FlakyStep::echo(StepKind::CodeExecution);

        let pipeline = Pipeline::new("test", ctx)
            .with_tracker(tracker.clone())
            .step(StepSpec::new(first.clone()))
            .step(StepSpec::new(skipped.clone()).skip_if(|_| true))
            .step(StepSpec::new(last.clone()));

        let value = pipeline.run(StepValue::Code("x = 1".into())).await.unwrap();

        assert_eq!(value.as_code(), Some("x = 1"));
        assert!(skipped.inputs().is_empty());
        assert_eq!(last.inputs(), vec!["x = 1".to_string()]);
        let names: Vec<String> = tracker.steps().into_iter().map(|s| s.step_type).collect();
        assert_eq!(names, vec!["CodeCleaning", "CodeExecution"]);
        assert_eq!(tracker.steps()[0].data, Some(json!({"content_type": "code", "value": "meta"})));
    }

    #[tokio::test]
    async fn test_non_retryable_error_skips_recovery() {
        let ctx = context(Config::default());
        let corrector = Arc::new(CountingCorrector::default());
        let step = FlakyStep::new(StepKind::ValidatePipelineInput, 1, || {
            ChatflowError::InvalidConfig("bad sources".into())
        });

        let pipeline = Pipeline::new("test", ctx.clone())
            .with_corrector(corrector.clone())
            .step(StepSpec::new(step).with_retry(RetryPolicy::ErrorCorrection));

        let err = pipeline.run(StepValue::Empty).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert_eq!(corrector.calls(), 0);
        assert_eq!(ctx.retry_budget().used(), 0);
    }

    #[tokio::test]
    async fn test_never_policy_propagates() {
        let ctx = context(Config::default());
        let step = FlakyStep::new(StepKind::CodeExecution, 1, execution_error);
        let pipeline = Pipeline::new("test", ctx).step(StepSpec::new(step.clone()));

        assert!(pipeline.run(StepValue::Code("x".into())).await.is_err());
        assert_eq!(step.inputs().len(), 1);
    }

    #[tokio::test]
    async fn test_reattempt_reruns_same_input() {
        let ctx = context(Config::default());
        let step = FlakyStep::new(StepKind::CodeGenerator, 2, || {
            ChatflowError::Llm(LlmError::Timeout(30))
        });
        let pipeline = Pipeline::new("test", ctx.clone())
            .step(StepSpec::new(step.clone()).with_retry(RetryPolicy::Reattempt));

        let value = pipeline.run(StepValue::Code("same".into())).await.unwrap();

        assert_eq!(value.as_code(), Some("same"));
        assert_eq!(step.inputs(), vec!["same", "same", "same"]);
        assert_eq!(ctx.retry_budget().used(), 2);
    }

    #[tokio::test]
    async fn test_reattempt_stops_at_budget() {
        let ctx = context(Config::default().with_max_retries(1));
        let step = FlakyStep::new(StepKind::CodeGenerator, 5, || {
            ChatflowError::Llm(LlmError::Api("overloaded".into()))
        });
        let pipeline = Pipeline::new("test", ctx)
            .step(StepSpec::new(step.clone()).with_retry(RetryPolicy::Reattempt));

        assert!(pipeline.run(StepValue::Empty).await.is_err());
        assert_eq!(step.inputs().len(), 2);
    }

    #[tokio::test]
    async fn test_correction_feeds_corrected_code_back() {
        let ctx = context(Config::default());
        let tracker = Arc::new(ExecutionTracker::new());
        let corrector = Arc::new(CountingCorrector::default());
        let step = FlakyStep::new(StepKind::CodeExecution, 1, execution_error);

        let pipeline = Pipeline::new("test", ctx)
            .with_tracker(tracker.clone())
            .with_corrector(corrector.clone())
            .step(StepSpec::new(step.clone()).with_retry(RetryPolicy::ErrorCorrection));

        let value = pipeline.run(StepValue::Code("broken".into())).await.unwrap();

        assert_eq!(value.as_code(), Some("fixed_1"));
        assert_eq!(step.inputs(), vec!["broken", "fixed_1"]);
        assert_eq!(corrector.seen.lock()[0], ("broken".to_string(), ErrorKind::Execution));

        let steps = tracker.steps();
        assert_eq!(steps.len(), 2);
        assert!(!steps[0].success);
        assert_eq!(steps[0].message, "Failed to execute code");
        assert_eq!(
            steps[0].data,
            Some(json!({
                "content_type": "code",
                "value": "broken",
                "exception": "Execution failed: KeyError: 'revenue'",
            }))
        );
        assert!(steps[1].success);
    }

    #[tokio::test]
    async fn test_correction_is_bounded_by_max_retries() {
        let ctx = context(Config::default().with_max_retries(3));
        let corrector = Arc::new(CountingCorrector::default());
        let step = FlakyStep::new(StepKind::CodeExecution, usize::MAX, execution_error);

        let pipeline = Pipeline::new("test", ctx.clone())
            .with_corrector(corrector.clone())
            .step(StepSpec::new(step.clone()).with_retry(RetryPolicy::ErrorCorrection));

        let err = pipeline.run(StepValue::Code("broken".into())).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(corrector.calls(), 3);
        assert_eq!(step.inputs(), vec!["broken", "fixed_1", "fixed_2", "fixed_3"]);
        assert_eq!(ctx.retry_budget().used(), 3);
    }

    #[tokio::test]
    async fn test_failed_correction_spends_budget_and_retries() {
        let ctx = context(Config::default().with_max_retries(3));
        let corrector = Arc::new(CountingCorrector {
            fail_first: Mutex::new(1),
            ..CountingCorrector::default()
        });
        let step = FlakyStep::new(StepKind::CodeExecution, 1, execution_error);

        let pipeline = Pipeline::new("test", ctx.clone())
            .with_corrector(corrector.clone())
            .step(StepSpec::new(step).with_retry(RetryPolicy::ErrorCorrection));

        let value = pipeline.run(StepValue::Code("broken".into())).await.unwrap();

        assert_eq!(value.as_code(), Some("fixed_2"));
        let seen = corrector.seen.lock().clone();
        assert_eq!(seen[1].1, ErrorKind::NoCodeFound);
        assert_eq!(ctx.retry_budget().used(), 2);
    }

    #[tokio::test]
    async fn test_correction_disabled_by_config() {
        let ctx = context(Config::default().with_error_correction(false));
        let corrector = Arc::new(CountingCorrector::default());
        let step = FlakyStep::new(StepKind::CodeExecution, 1, execution_error);

        let pipeline = Pipeline::new("test", ctx)
            .with_corrector(corrector.clone())
            .step(StepSpec::new(step).with_retry(RetryPolicy::ErrorCorrection));

        assert!(pipeline.run(StepValue::Code("broken".into())).await.is_err());
        assert_eq!(corrector.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_retries_means_no_correction() {
        let ctx = context(Config::default().with_max_retries(0));
        let corrector = Arc::new(CountingCorrector::default());
        let step = FlakyStep::new(StepKind::CodeExecution, 1, execution_error);

        let pipeline = Pipeline::new("test", ctx)
            .with_corrector(corrector.clone())
            .step(StepSpec::new(step).with_retry(RetryPolicy::ErrorCorrection));

        assert!(pipeline.run(StepValue::Code("broken".into())).await.is_err());
        assert_eq!(corrector.calls(), 0);
    }

    #[tokio::test]
    async fn test_observer_points() {
        let ctx = context(Config::default());
        let observer = Arc::new(RecordingObserver::new());
        let corrector = Arc::new(CountingCorrector::default());
        let generator = FlakyStep::echo(StepKind::CodeGenerator);
        let execution = FlakyStep::new(StepKind::CodeExecution, 1, execution_error);

        let pipeline = Pipeline::new("test", ctx)
            .with_observer(observer.clone())
            .with_corrector(corrector)
            .step(StepSpec::new(generator).observe(ObservePoint::CodeGenerated))
            .step(
                StepSpec::new(execution)
                    .with_retry(RetryPolicy::ErrorCorrection)
                    .observe(ObservePoint::CodeAboutToRun),
            );

        pipeline.run(StepValue::Code("first".into())).await.unwrap();

        assert_eq!(
            observer.events(),
            vec![
                ObservedEvent::Code("first".into()),
                ObservedEvent::BeforeExecution("first".into()),
                ObservedEvent::BeforeExecution("fixed_1".into()),
            ]
        );
    }
}
