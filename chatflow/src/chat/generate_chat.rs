//! The generate-chat orchestrator.

use super::{ErrorCorrectionPipeline, Judge};
use crate::context::{
    ChatPipelineInput, CodeExecutionPipelineInput, PipelineContext, FOUND_IN_CACHE,
    LAST_CODE_CLEANED, LAST_PROMPT_ID, OUTPUT_TYPE,
};
use crate::core::{ChatReply, ChatResult, OutputType, StepValue};
use crate::errors::{ChatflowError, Result};
use crate::pipeline::{
    CodeCorrector, NoOpObserver, ObservePoint, Pipeline, PipelineObserver, RetryPolicy, StepSpec,
};
use crate::steps::{
    CacheLookup, CachePopulation, CodeCleaning, CodeExecution, CodeGenerator, PromptGeneration,
    ResultParsing, ResultValidation, ValidatePipelineInput,
};
use crate::tracker::ExecutionTracker;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Fixed start of every error reply.
pub const ERROR_PREAMBLE: &str =
    "Unfortunately, I was not able to answer your question, because of the following error:";

/// Renders the user-facing reply for an error that ended a run.
#[must_use]
pub fn format_error_reply(error: &ChatflowError) -> String {
    format!("{ERROR_PREAMBLE}\n\n{error}\n")
}

/// Composes the full query-to-answer flow.
///
/// Code generation runs validate, cache lookup, prompt generation, code
/// generation, cache population and cleaning. Execution runs code execution,
/// result validation and result parsing. Cleaning and execution failures are
/// handed to the error-correction sub-pipeline. Every entry point returns a
/// [`ChatReply`] and publishes the trace exactly once.
pub struct GenerateChatPipeline {
    context: Arc<PipelineContext>,
    tracker: Arc<ExecutionTracker>,
    judge: Option<Arc<dyn Judge>>,
    code_generation: Pipeline,
    code_execution: Pipeline,
    run_lock: tokio::sync::Mutex<()>,
    last_error: RwLock<Option<String>>,
}

impl std::fmt::Debug for GenerateChatPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateChatPipeline")
            .field("code_generation", &self.code_generation)
            .field("code_execution", &self.code_execution)
            .field("judge", &self.judge.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`GenerateChatPipeline`].
pub struct GenerateChatPipelineBuilder {
    context: Arc<PipelineContext>,
    tracker: Option<Arc<ExecutionTracker>>,
    judge: Option<Arc<dyn Judge>>,
    observer: Arc<dyn PipelineObserver>,
}

impl GenerateChatPipelineBuilder {
    /// Sets the tracker. Defaults to one configured from the context.
    #[must_use]
    pub fn tracker(mut self, tracker: Arc<ExecutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Gates generated code through `judge` before execution.
    #[must_use]
    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Sets the observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Wires the pipelines.
    #[must_use]
    pub fn build(self) -> GenerateChatPipeline {
        let context = self.context;
        let tracker = self
            .tracker
            .unwrap_or_else(|| Arc::new(ExecutionTracker::from_config(context.config())));
        let observer = self.observer;
        let corrector: Arc<dyn CodeCorrector> = Arc::new(ErrorCorrectionPipeline::with_parts(
            Arc::clone(&context),
            Some(Arc::clone(&tracker)),
            Arc::clone(&observer),
        ));

        let code_generation = Pipeline::new("generate_code", Arc::clone(&context))
            .with_tracker(Arc::clone(&tracker))
            .with_observer(Arc::clone(&observer))
            .with_corrector(Arc::clone(&corrector))
            .step(StepSpec::new(Arc::new(ValidatePipelineInput::new())))
            .step(StepSpec::new(Arc::new(CacheLookup::new())))
            .step(
                StepSpec::new(Arc::new(PromptGeneration::new()))
                    .skip_if(PipelineContext::found_in_cache)
                    .observe(ObservePoint::PromptGenerated),
            )
            .step(
                StepSpec::new(Arc::new(CodeGenerator::new()))
                    .skip_if(PipelineContext::found_in_cache)
                    .with_retry(RetryPolicy::Reattempt)
                    .observe(ObservePoint::CodeGenerated),
            )
            .step(
                StepSpec::new(Arc::new(CachePopulation::new()))
                    .skip_if(PipelineContext::found_in_cache),
            )
            .step(
                StepSpec::new(Arc::new(CodeCleaning::new()))
                    .skip_if(|ctx| ctx.last_code_generated().is_none())
                    .with_retry(RetryPolicy::ErrorCorrection),
            );

        let code_execution = Pipeline::new("execute_code", Arc::clone(&context))
            .with_tracker(Arc::clone(&tracker))
            .with_observer(observer)
            .with_corrector(corrector)
            .step(
                StepSpec::new(Arc::new(CodeExecution::new()))
                    .with_retry(RetryPolicy::ErrorCorrection)
                    .observe(ObservePoint::CodeAboutToRun),
            )
            .step(StepSpec::new(Arc::new(ResultValidation::new())))
            .step(
                StepSpec::new(Arc::new(ResultParsing::new())).observe(ObservePoint::ResultReady),
            );

        GenerateChatPipeline {
            context,
            tracker,
            judge: self.judge,
            code_generation,
            code_execution,
            run_lock: tokio::sync::Mutex::new(()),
            last_error: RwLock::new(None),
        }
    }
}

impl GenerateChatPipeline {
    /// Starts building an orchestrator around `context`.
    #[must_use]
    pub fn builder(context: Arc<PipelineContext>) -> GenerateChatPipelineBuilder {
        GenerateChatPipelineBuilder {
            context,
            tracker: None,
            judge: None,
            observer: Arc::new(NoOpObserver),
        }
    }

    /// The shared context.
    #[must_use]
    pub const fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// The execution tracker.
    #[must_use]
    pub const fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    /// Message of the error that ended the last run, if it failed.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Collector identifier of the last published trace.
    #[must_use]
    pub fn last_log_id(&self) -> Option<String> {
        self.tracker.last_log_id()
    }

    /// Answers a query: generates (or reuses) code, runs it and parses the
    /// result.
    pub async fn run(&self, input: ChatPipelineInput) -> ChatReply {
        let _guard = self.run_lock.lock().await;
        self.begin(
            &input.query,
            input.conversation_id,
            input.output_type,
            input.prompt_id,
        );

        let outcome = self.answer(&input).await;
        if let Ok(response) = &outcome {
            self.tracker.set_final_response(response).await;
        }
        self.finish(outcome, ChatReply::Answer).await
    }

    /// Generates code without running it. The judge is not consulted.
    pub async fn run_generate_code(&self, input: ChatPipelineInput) -> ChatReply {
        let _guard = self.run_lock.lock().await;
        self.begin(
            &input.query,
            input.conversation_id,
            input.output_type,
            input.prompt_id,
        );

        let outcome = self.generate_once(&input).await;
        self.finish(outcome, ChatReply::Code).await
    }

    /// Runs caller-supplied code, with error correction, and parses the
    /// result.
    pub async fn run_execute_code(&self, input: CodeExecutionPipelineInput) -> ChatReply {
        let _guard = self.run_lock.lock().await;
        self.begin(
            &input.code,
            input.conversation_id,
            input.output_type,
            input.prompt_id,
        );

        let outcome = self.execute(input.code).await;
        if let Ok(response) = &outcome {
            self.tracker.set_final_response(response).await;
        }
        self.finish(outcome, ChatReply::Answer).await
    }

    fn begin(
        &self,
        query: &str,
        conversation_id: Uuid,
        output_type: Option<OutputType>,
        prompt_id: Uuid,
    ) {
        let ctx = &self.context;
        ctx.reset_intermediate_values();

        self.tracker.start_new_track(conversation_id, query, output_type);
        self.tracker.add_skills(&ctx.skills());
        self.tracker.add_data_sources(ctx.data_sources());

        ctx.memory_mut().add(query, true);
        if let Some(output_type) = output_type {
            ctx.add(OUTPUT_TYPE, json!(output_type.as_str()));
        }
        ctx.add(LAST_PROMPT_ID, json!(prompt_id.to_string()));

        tracing::info!(
            conversation_id = %conversation_id,
            prompt_id = %prompt_id,
            "Question: {query}"
        );
    }

    async fn answer(&self, input: &ChatPipelineInput) -> Result<ChatResult> {
        let code = self.generate(input).await?;
        self.execute(code).await
    }

    async fn generate(&self, input: &ChatPipelineInput) -> Result<String> {
        let mut code = self.generate_once(input).await?;
        let Some(judge) = &self.judge else {
            return Ok(code);
        };

        let rounds = self.context.config().max_retries;
        for round in 1..=rounds {
            if judge.evaluate(&input.query, &code).await? {
                tracing::debug!(round, "Judge accepted generated code");
                return Ok(code);
            }
            tracing::info!(round, max_rounds = rounds, "Judge rejected generated code");
            self.forget_cached_code().await;
            code = self.generate_once(input).await?;
        }

        tracing::warn!(rounds, "Judge rounds exhausted, using last candidate");
        Ok(code)
    }

    async fn generate_once(&self, input: &ChatPipelineInput) -> Result<String> {
        self.code_generation
            .run(StepValue::Query(input.clone()))
            .await?
            .into_code()
    }

    async fn forget_cached_code(&self) {
        if let Some(cache) = self.context.cache() {
            let key = cache.get_cache_key(&self.context);
            if let Err(error) = cache.delete(&key).await {
                tracing::warn!(cache_key = %key, error = %error, "Failed to delete rejected code from cache");
            }
        }
        self.context.intermediate().remove(FOUND_IN_CACHE);
    }

    async fn execute(&self, code: String) -> Result<ChatResult> {
        self.code_execution
            .run(StepValue::Code(code))
            .await?
            .into_response()
    }

    async fn finish<T>(&self, outcome: Result<T>, reply: impl FnOnce(T) -> ChatReply) -> ChatReply {
        let reply = match outcome {
            Ok(value) => {
                self.tracker.set_success(true);
                *self.last_error.write() = None;
                reply(value)
            }
            Err(error) => {
                tracing::error!(kind = %error.kind(), error = %error, "Pipeline failed");
                self.context.intermediate().remove(LAST_CODE_CLEANED);
                self.tracker.set_success(false);
                *self.last_error.write() = Some(error.to_string());
                ChatReply::Error(format_error_reply(&error))
            }
        };
        self.tracker.publish().await;
        reply
    }
}
