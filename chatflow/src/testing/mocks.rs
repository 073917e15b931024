//! Deterministic collaborator doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::connectors::{CodeExecutor, DataConnector, DataSchema, DataSource, SqlCredentials};
use crate::context::PipelineContext;
use crate::core::{ChatResult, ExecutionResult};
use crate::errors::{ChatflowError, Result};
use crate::llm::{extract_code, LlmClient};
use crate::pipeline::PipelineObserver;
use crate::prompts::Prompt;
use crate::tracker::TraceCollector;

/// Code returned by [`ScriptedLlm`] once its queue is empty.
pub const DEFAULT_CODE: &str = "result = {\"type\": \"number\", \"value\": 42}";

/// An LLM that answers from queues and counts its calls.
#[derive(Debug)]
pub struct ScriptedLlm {
    code_answers: Mutex<VecDeque<Result<String>>>,
    text_answers: Mutex<VecDeque<Result<String>>>,
    fallback_code: String,
    code_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    /// Creates an LLM answering [`DEFAULT_CODE`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_answers: Mutex::new(VecDeque::new()),
            text_answers: Mutex::new(VecDeque::new()),
            fallback_code: DEFAULT_CODE.to_string(),
            code_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers `code` once the queue is empty.
    #[must_use]
    pub fn with_fallback_code(mut self, code: impl Into<String>) -> Self {
        self.fallback_code = code.into();
        self
    }

    /// Queues a code answer.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.push_code(code);
        self
    }

    /// Queues a text answer for `complete`.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Queues a code answer.
    pub fn push_code(&self, code: impl Into<String>) {
        self.code_answers.lock().push_back(Ok(code.into()));
    }

    /// Queues a failure for the next code generation.
    pub fn push_error(&self, error: ChatflowError) {
        self.code_answers.lock().push_back(Err(error));
    }

    /// Queues a text answer for `complete`.
    pub fn push_text(&self, text: impl Into<String>) {
        self.text_answers.lock().push_back(Ok(text.into()));
    }

    /// Queues a failure for the next `complete`.
    pub fn push_text_error(&self, error: ChatflowError) {
        self.text_answers.lock().push_back(Err(error));
    }

    /// Number of code generation calls.
    #[must_use]
    pub fn code_calls(&self) -> usize {
        self.code_calls.load(Ordering::SeqCst)
    }

    /// Number of `complete` calls.
    #[must_use]
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn kind(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.clone());
        let answer = self.text_answers.lock().pop_front();
        answer.unwrap_or_else(|| Ok("ok".to_string()))
    }

    async fn generate_code(&self, prompt: &Prompt, _ctx: &PipelineContext) -> Result<String> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.clone());
        let answer = self.code_answers.lock().pop_front();
        extract_code(&answer.unwrap_or_else(|| Ok(self.fallback_code.clone()))?)
    }

    fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().map(|prompt| prompt.text.clone())
    }
}

#[derive(Debug)]
enum Fallback {
    Succeed(ExecutionResult),
    Fail(String),
}

/// An executor that replays queued outcomes and records the code it ran.
#[derive(Debug)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<ExecutionResult>>>,
    fallback: Fallback,
    executed: Mutex<Vec<String>>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    /// Creates an executor returning the number `42`.
    #[must_use]
    pub fn new() -> Self {
        Self::succeeding(ExecutionResult::new("number", json!(42)))
    }

    /// Creates an executor returning `result` once its queue is empty.
    #[must_use]
    pub fn succeeding(result: ExecutionResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Fallback::Succeed(result),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Creates an executor that always fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Fallback::Fail(message.into()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Queues an outcome.
    pub fn push(&self, outcome: Result<ExecutionResult>) {
        self.script.lock().push_back(outcome);
    }

    /// Number of executions.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.executed.lock().len()
    }

    /// Every code string executed, in order.
    #[must_use]
    pub fn executed_code(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl CodeExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        code: &str,
        _sources: &[Arc<dyn DataConnector>],
    ) -> Result<ExecutionResult> {
        self.executed.lock().push(code.to_string());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| match &self.fallback {
            Fallback::Succeed(result) => Ok(result.clone()),
            Fallback::Fail(message) => Err(ChatflowError::execution(message.clone())),
        })
    }
}

/// A connector with a fixed schema.
#[derive(Debug, Clone)]
pub struct StaticConnector {
    schema: DataSchema,
    source: DataSource,
}

impl StaticConnector {
    /// Creates an in-process table.
    #[must_use]
    pub fn dataframe(name: &str, columns: &[&str]) -> Self {
        Self {
            schema: DataSchema {
                name: name.to_string(),
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
                ..DataSchema::default()
            },
            source: DataSource::Dataframe { sql_enabled: false },
        }
    }

    /// Creates a SQL table.
    #[must_use]
    pub fn sql(name: &str, columns: &[&str], credentials: SqlCredentials) -> Self {
        Self {
            source: DataSource::Sql(credentials),
            ..Self::dataframe(name, columns)
        }
    }

    /// Marks a dataframe as queryable through `execute_sql_query`.
    #[must_use]
    pub fn with_sql_enabled(mut self, enabled: bool) -> Self {
        if let DataSource::Dataframe { sql_enabled } = &mut self.source {
            *sql_enabled = enabled;
        }
        self
    }

    /// Sets the sample rows.
    #[must_use]
    pub fn with_rows(mut self, rows: Vec<Vec<serde_json::Value>>) -> Self {
        self.schema.row_count = rows.len();
        self.schema.head = rows;
        self
    }
}

impl DataConnector for StaticConnector {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn source(&self) -> DataSource {
        self.source.clone()
    }

    fn schema(&self) -> DataSchema {
        self.schema.clone()
    }
}

/// One observer callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    /// `on_prompt_generated` with the prompt text.
    Prompt(String),
    /// `on_code_generated`.
    Code(String),
    /// `before_code_execution`.
    BeforeExecution(String),
    /// `on_result` with the result text.
    Result(String),
}

/// An observer that records every callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every callback, in order.
    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    /// Code passed to `before_code_execution`, in order.
    #[must_use]
    pub fn executed_code(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::BeforeExecution(code) => Some(code.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_prompt_generated(&self, prompt: &Prompt) {
        self.events.lock().push(ObservedEvent::Prompt(prompt.text.clone()));
    }

    fn on_code_generated(&self, code: &str) {
        self.events.lock().push(ObservedEvent::Code(code.to_string()));
    }

    fn before_code_execution(&self, code: &str) {
        self.events.lock().push(ObservedEvent::BeforeExecution(code.to_string()));
    }

    fn on_result(&self, result: &ChatResult) {
        self.events.lock().push(ObservedEvent::Result(result.to_text()));
    }
}

/// A trace collector that keeps every submitted trace.
#[derive(Debug, Default)]
pub struct RecordingCollector {
    submitted: Mutex<Vec<serde_json::Value>>,
    log_id: Option<String>,
    fail: bool,
}

impl RecordingCollector {
    /// Creates a collector that acknowledges without an identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector acknowledging with `log_id`.
    #[must_use]
    pub fn with_log_id(log_id: impl Into<String>) -> Self {
        Self {
            log_id: Some(log_id.into()),
            ..Self::default()
        }
    }

    /// Creates a collector that rejects every trace.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every submitted trace, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<serde_json::Value> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl TraceCollector for RecordingCollector {
    async fn submit(&self, summary: &serde_json::Value) -> Result<Option<String>> {
        self.submitted.lock().push(summary.clone());
        if self.fail {
            return Err(ChatflowError::internal("collector unavailable"));
        }
        Ok(self.log_id.clone())
    }
}
