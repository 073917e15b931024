//! Compile-time registry of pipeline constructors.

use super::{ErrorCorrectionPipeline, GenerateChatPipeline, Judge};
use crate::context::PipelineContext;
use crate::errors::{ChatflowError, Result};
use crate::pipeline::{NoOpObserver, PipelineObserver};
use crate::tracker::ExecutionTracker;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The pipelines the crate can assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// [`GenerateChatPipeline`].
    Chat,
    /// [`ErrorCorrectionPipeline`].
    ErrorCorrection,
}

impl PipelineKind {
    /// Every kind, in registration order.
    pub const ALL: [Self; 2] = [Self::Chat, Self::ErrorCorrection];

    /// Returns the registry name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::ErrorCorrection => "error_correction",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = ChatflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ChatflowError::InvalidConfig(format!("unknown pipeline `{s}`")))
    }
}

/// Everything a constructor may wire into a pipeline.
#[derive(Clone)]
pub struct PipelineParts {
    /// Shared context.
    pub context: Arc<PipelineContext>,
    /// Trace recorder.
    pub tracker: Arc<ExecutionTracker>,
    /// Observer.
    pub observer: Arc<dyn PipelineObserver>,
    /// Optional judge.
    pub judge: Option<Arc<dyn Judge>>,
}

impl PipelineParts {
    /// Parts with a tracker configured from the context and no observer.
    #[must_use]
    pub fn new(context: Arc<PipelineContext>) -> Self {
        let tracker = Arc::new(ExecutionTracker::from_config(context.config()));
        Self {
            context,
            tracker,
            observer: Arc::new(NoOpObserver),
            judge: None,
        }
    }
}

/// A pipeline assembled by the registry.
#[derive(Debug)]
pub enum BuiltPipeline {
    /// The orchestrator.
    Chat(GenerateChatPipeline),
    /// The correction sub-pipeline.
    ErrorCorrection(ErrorCorrectionPipeline),
}

/// Builds a pipeline from its parts.
pub type PipelineConstructor = fn(PipelineParts) -> BuiltPipeline;

fn build_chat(parts: PipelineParts) -> BuiltPipeline {
    let mut builder = GenerateChatPipeline::builder(parts.context)
        .tracker(parts.tracker)
        .observer(parts.observer);
    if let Some(judge) = parts.judge {
        builder = builder.judge(judge);
    }
    BuiltPipeline::Chat(builder.build())
}

fn build_error_correction(parts: PipelineParts) -> BuiltPipeline {
    BuiltPipeline::ErrorCorrection(ErrorCorrectionPipeline::with_parts(
        parts.context,
        Some(parts.tracker),
        parts.observer,
    ))
}

/// Maps pipeline kinds to constructors.
#[derive(Debug, Clone)]
pub struct PipelineRegistry {
    constructors: HashMap<PipelineKind, PipelineConstructor>,
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PipelineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in pipelines.
    #[must_use]
    pub fn with_defaults() -> Self {
        let defaults: [(PipelineKind, PipelineConstructor); 2] = [
            (PipelineKind::Chat, build_chat),
            (PipelineKind::ErrorCorrection, build_error_correction),
        ];
        Self {
            constructors: defaults.into_iter().collect(),
        }
    }

    /// Registers or replaces the constructor for `kind`.
    pub fn register(&mut self, kind: PipelineKind, constructor: PipelineConstructor) {
        self.constructors.insert(kind, constructor);
    }

    /// Whether `kind` has a constructor.
    #[must_use]
    pub fn contains(&self, kind: PipelineKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Builds the pipeline registered for `kind`.
    pub fn build(&self, kind: PipelineKind, parts: PipelineParts) -> Result<BuiltPipeline> {
        let constructor = self.constructors.get(&kind).ok_or_else(|| {
            ChatflowError::InvalidConfig(format!("no pipeline registered for `{kind}`"))
        })?;
        Ok(constructor(parts))
    }

    /// Parses `name` and builds the matching pipeline.
    pub fn build_named(&self, name: &str, parts: PipelineParts) -> Result<BuiltPipeline> {
        self.build(name.parse()?, parts)
    }
}
