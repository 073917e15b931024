//! The shared, mutable context passed to every step.

use super::{IntermediateValues, Memory, SkillsManager};
use crate::cache::{Cache, InMemoryCache};
use crate::config::Config;
use crate::connectors::{CodeExecutor, DataConnector};
use crate::core::OutputType;
use crate::llm::LlmClient;
use crate::pipeline::RetryBudget;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Set by cache lookup on a hit.
pub const FOUND_IN_CACHE: &str = "found_in_cache";
/// Code most recently produced by the LLM or the cache.
pub const LAST_CODE_GENERATED: &str = "last_code_generated";
/// Code that passed cleaning during this run.
pub const LAST_CODE_CLEANED: &str = "last_code_cleaned";
/// Code most recently handed to the executor.
pub const LAST_CODE_EXECUTED: &str = "last_code_executed";
/// Requested output type of the current run.
pub const OUTPUT_TYPE: &str = "output_type";
/// Prompt ID of the current run.
pub const LAST_PROMPT_ID: &str = "last_prompt_id";
/// Result of the last execution.
pub const LAST_RESULT: &str = "last_result";

/// State shared by all steps of a session.
///
/// One context serves one request at a time. Steps communicate only through
/// the intermediate values, which are reset at the start of every top-level
/// run together with the retry budget.
pub struct PipelineContext {
    data_sources: Vec<Arc<dyn DataConnector>>,
    config: Config,
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn CodeExecutor>,
    memory: RwLock<Memory>,
    cache: Option<Arc<dyn Cache>>,
    skills: RwLock<SkillsManager>,
    intermediate: IntermediateValues,
    retry_budget: RetryBudget,
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("data_sources", &self.data_sources.len())
            .field("llm", &self.llm.kind())
            .field("cache", &self.cache.is_some())
            .field("intermediate", &self.intermediate)
            .field("retry_budget", &self.retry_budget)
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    /// Starts building a context around the two required collaborators.
    #[must_use]
    pub fn builder(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn CodeExecutor>,
    ) -> PipelineContextBuilder {
        PipelineContextBuilder::new(llm, executor)
    }

    /// Bound data sources.
    #[must_use]
    pub fn data_sources(&self) -> &[Arc<dyn DataConnector>] {
        &self.data_sources
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The LLM collaborator.
    #[must_use]
    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// The code executor.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn CodeExecutor> {
        &self.executor
    }

    /// The cache, present only when caching is enabled.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Reads the conversation memory. Do not hold across an `.await`.
    pub fn memory(&self) -> RwLockReadGuard<'_, Memory> {
        self.memory.read()
    }

    /// Mutates the conversation memory. Do not hold across an `.await`.
    pub fn memory_mut(&self) -> RwLockWriteGuard<'_, Memory> {
        self.memory.write()
    }

    /// Reads the skills registry.
    pub fn skills(&self) -> RwLockReadGuard<'_, SkillsManager> {
        self.skills.read()
    }

    /// Mutates the skills registry.
    pub fn skills_mut(&self) -> RwLockWriteGuard<'_, SkillsManager> {
        self.skills.write()
    }

    /// The intermediate value bag.
    #[must_use]
    pub const fn intermediate(&self) -> &IntermediateValues {
        &self.intermediate
    }

    /// The per-run retry budget.
    #[must_use]
    pub const fn retry_budget(&self) -> &RetryBudget {
        &self.retry_budget
    }

    /// Gets an intermediate value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.intermediate.get(key)
    }

    /// Sets an intermediate value.
    pub fn add(&self, key: impl Into<String>, value: serde_json::Value) {
        self.intermediate.add(key, value);
    }

    /// Sets several intermediate values.
    pub fn add_many(&self, values: impl IntoIterator<Item = (String, serde_json::Value)>) {
        self.intermediate.add_many(values);
    }

    /// Restores the initial intermediate values and refills the retry budget.
    pub fn reset_intermediate_values(&self) {
        self.intermediate.reset();
        self.retry_budget.reset();
    }

    /// Whether cache lookup hit during this run.
    #[must_use]
    pub fn found_in_cache(&self) -> bool {
        self.intermediate.get_flag(FOUND_IN_CACHE)
    }

    /// The requested output type of this run.
    #[must_use]
    pub fn output_type(&self) -> Option<OutputType> {
        self.intermediate
            .get_str(OUTPUT_TYPE)
            .and_then(|s| s.parse().ok())
    }

    /// The last generated code of this run.
    #[must_use]
    pub fn last_code_generated(&self) -> Option<String> {
        self.intermediate
            .get_str(LAST_CODE_GENERATED)
            .filter(|code| !code.is_empty())
    }

    /// The last code of this run that passed cleaning.
    #[must_use]
    pub fn last_code_cleaned(&self) -> Option<String> {
        self.intermediate
            .get_str(LAST_CODE_CLEANED)
            .filter(|code| !code.is_empty())
    }
}

/// Builder for [`PipelineContext`].
pub struct PipelineContextBuilder {
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn CodeExecutor>,
    data_sources: Vec<Arc<dyn DataConnector>>,
    config: Config,
    memory: Option<Memory>,
    cache: Option<Arc<dyn Cache>>,
    skills: SkillsManager,
    initial_values: HashMap<String, serde_json::Value>,
}

impl PipelineContextBuilder {
    fn new(llm: Arc<dyn LlmClient>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            llm,
            executor,
            data_sources: Vec::new(),
            config: Config::default(),
            memory: None,
            cache: None,
            skills: SkillsManager::new(),
            initial_values: HashMap::new(),
        }
    }

    /// Binds a data source.
    #[must_use]
    pub fn data_source(mut self, source: Arc<dyn DataConnector>) -> Self {
        self.data_sources.push(source);
        self
    }

    /// Binds several data sources.
    #[must_use]
    pub fn data_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn DataConnector>>) -> Self {
        self.data_sources.extend(sources);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the memory. Defaults to an empty memory sized by the config.
    #[must_use]
    pub fn memory(mut self, memory: Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Sets the cache. Ignored when caching is disabled.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the skills registry.
    #[must_use]
    pub fn skills(mut self, skills: SkillsManager) -> Self {
        self.skills = skills;
        self
    }

    /// Sets the snapshot intermediate values are reset to.
    #[must_use]
    pub fn initial_values(mut self, values: HashMap<String, serde_json::Value>) -> Self {
        self.initial_values = values;
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> PipelineContext {
        let cache = if self.config.enable_cache {
            Some(
                self.cache
                    .unwrap_or_else(|| Arc::new(InMemoryCache::new()) as Arc<dyn Cache>),
            )
        } else {
            None
        };
        let memory = self
            .memory
            .unwrap_or_else(|| Memory::new(self.config.memory_size));

        PipelineContext {
            data_sources: self.data_sources,
            config: self.config,
            llm: self.llm,
            executor: self.executor,
            memory: RwLock::new(memory),
            cache,
            skills: RwLock::new(self.skills),
            intermediate: IntermediateValues::from_initial(self.initial_values),
            retry_budget: RetryBudget::new(),
        }
    }
}
