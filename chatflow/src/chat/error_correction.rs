//! The error-correction sub-pipeline.

use crate::context::{ErrorCorrectionInput, PipelineContext};
use crate::core::StepValue;
use crate::errors::Result;
use crate::pipeline::{
    CodeCorrector, NoOpObserver, ObservePoint, Pipeline, PipelineObserver, StepSpec,
};
use crate::steps::{CodeCleaning, CodeGenerator, ErrorPromptGeneration};
use crate::tracker::ExecutionTracker;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns a failing code string and its error into corrected, cleaned code.
///
/// The correction prompt is picked from the error kind. The sub-pipeline
/// shares the parent's context, so memory and the retry budget are the
/// parent's too. Its own steps never retry; the caller owns the bound.
#[derive(Debug)]
pub struct ErrorCorrectionPipeline {
    pipeline: Pipeline,
}

impl ErrorCorrectionPipeline {
    /// Creates the sub-pipeline around `context`.
    #[must_use]
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self::with_parts(context, None, Arc::new(NoOpObserver))
    }

    /// Creates the sub-pipeline recording into `tracker` and reporting to
    /// `observer`.
    #[must_use]
    pub fn with_parts(
        context: Arc<PipelineContext>,
        tracker: Option<Arc<ExecutionTracker>>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        let mut pipeline = Pipeline::new("error_correction", context)
            .with_observer(observer)
            .step(
                StepSpec::new(Arc::new(ErrorPromptGeneration::new()))
                    .observe(ObservePoint::PromptGenerated),
            )
            .step(StepSpec::new(Arc::new(CodeGenerator::new())).observe(ObservePoint::CodeGenerated))
            .step(StepSpec::new(Arc::new(CodeCleaning::new())));
        if let Some(tracker) = tracker {
            pipeline = pipeline.with_tracker(tracker);
        }
        Self { pipeline }
    }

    /// Produces corrected code for `input`.
    pub async fn run(&self, input: ErrorCorrectionInput) -> Result<String> {
        self.pipeline
            .run(StepValue::Correction(input))
            .await?
            .into_code()
    }
}

#[async_trait]
impl CodeCorrector for ErrorCorrectionPipeline {
    async fn correct(&self, input: ErrorCorrectionInput) -> Result<String> {
        self.run(input).await
    }
}
