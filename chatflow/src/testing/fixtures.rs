//! Test fixtures wiring doubles into a chat pipeline.

use std::sync::Arc;

use super::{RecordingCollector, RecordingObserver, ScriptedExecutor, ScriptedLlm, StaticConnector};
use crate::chat::GenerateChatPipeline;
use crate::config::Config;
use crate::connectors::DataConnector;
use crate::context::{ChatPipelineInput, PipelineContext};
use crate::pipeline::BackoffConfig;
use crate::tracker::ExecutionTracker;
use uuid::Uuid;

/// Doubles plus the pipeline wired around them.
///
/// Defaults: a `sales(region, revenue)` dataframe, immediate LLM backoff and
/// a tracker publishing into a [`RecordingCollector`].
#[derive(Debug)]
pub struct TestFixture {
    /// The scripted LLM.
    pub llm: Arc<ScriptedLlm>,
    /// The scripted executor.
    pub executor: Arc<ScriptedExecutor>,
    /// The recording observer.
    pub observer: Arc<RecordingObserver>,
    /// The recording collector.
    pub collector: Arc<RecordingCollector>,
    /// The tracker publishing into `collector`.
    pub tracker: Arc<ExecutionTracker>,
    /// The shared context.
    pub context: Arc<PipelineContext>,
    /// The conversation used by [`Self::input`].
    pub conversation_id: Uuid,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Creates a fixture with default doubles and configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with(ScriptedLlm::new(), ScriptedExecutor::new(), Self::config())
    }

    /// The default test configuration.
    #[must_use]
    pub fn config() -> Config {
        Config::default().with_llm_backoff(BackoffConfig::immediate())
    }

    /// The default data source.
    #[must_use]
    pub fn sales() -> Arc<dyn DataConnector> {
        Arc::new(StaticConnector::dataframe("sales", &["region", "revenue"]))
    }

    /// Creates a fixture around the given doubles, bound to [`Self::sales`].
    #[must_use]
    pub fn with(llm: ScriptedLlm, executor: ScriptedExecutor, config: Config) -> Self {
        Self::with_sources(llm, executor, config, vec![Self::sales()])
    }

    /// Creates a fixture around the given doubles and data sources.
    #[must_use]
    pub fn with_sources(
        llm: ScriptedLlm,
        executor: ScriptedExecutor,
        config: Config,
        sources: Vec<Arc<dyn DataConnector>>,
    ) -> Self {
        let llm = Arc::new(llm);
        let executor = Arc::new(executor);
        let collector = Arc::new(RecordingCollector::with_log_id("log-test"));
        let tracker = Arc::new(ExecutionTracker::new().with_collector(collector.clone()));
        let context = Arc::new(
            PipelineContext::builder(llm.clone(), executor.clone())
                .data_sources(sources)
                .config(config)
                .build(),
        );
        Self {
            llm,
            executor,
            observer: Arc::new(RecordingObserver::new()),
            collector,
            tracker,
            context,
            conversation_id: Uuid::new_v4(),
        }
    }

    /// Builds the chat pipeline around the fixture.
    #[must_use]
    pub fn pipeline(&self) -> GenerateChatPipeline {
        GenerateChatPipeline::builder(Arc::clone(&self.context))
            .tracker(Arc::clone(&self.tracker))
            .observer(self.observer.clone())
            .build()
    }

    /// A query input in the fixture's conversation.
    #[must_use]
    pub fn input(&self, query: &str) -> ChatPipelineInput {
        ChatPipelineInput::new(query, self.conversation_id)
    }

    /// Names of the tracked steps of the last run, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<String> {
        self.tracker.steps().into_iter().map(|s| s.step_type).collect()
    }

    /// How many tracked steps of the last run have `name`.
    #[must_use]
    pub fn step_count(&self, name: &str) -> usize {
        self.tracker
            .steps()
            .iter()
            .filter(|s| s.step_type == name)
            .count()
    }
}
