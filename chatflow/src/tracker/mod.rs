//! Per-run execution traces.
//!
//! An [`ExecutionTracker`] records one trace per top-level run: the query,
//! skills and data-source heads, every executed step, the final response and
//! whether the run succeeded. [`ExecutionTracker::publish`] finalizes the
//! trace and hands it to an optional [`TraceCollector`].

mod collector;

#[cfg(feature = "remote-log")]
pub use collector::HttpTraceCollector;
pub use collector::TraceCollector;

use crate::config::Config;
use crate::connectors::DataConnector;
use crate::context::SkillsManager;
use crate::core::{ChatResult, OutputType};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// One step record of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedStep {
    /// Step name, e.g. `"CodeExecution"`.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Whether the step succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Wall time in seconds.
    pub execution_time: f64,
    /// Step payload (`content_type`/`value`, plus `exception` on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TrackedStep {
    /// Creates a step record.
    #[must_use]
    pub fn new(step_type: impl Into<String>, success: bool, message: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            success,
            message: message.into(),
            execution_time: 0.0,
            data: None,
        }
    }

    /// Sets the elapsed time in seconds.
    #[must_use]
    pub const fn with_execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = seconds;
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

struct TrackState {
    conversation_id: Option<Uuid>,
    query: String,
    output_type: Option<OutputType>,
    skills: Vec<serde_json::Value>,
    dataframes: Vec<serde_json::Value>,
    steps: Vec<TrackedStep>,
    response: Option<serde_json::Value>,
    success: bool,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl TrackState {
    fn new() -> Self {
        Self {
            conversation_id: None,
            query: String::new(),
            output_type: None,
            skills: Vec::new(),
            dataframes: Vec::new(),
            steps: Vec::new(),
            response: None,
            success: false,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(feature = "remote-log")]
fn default_collector(config: &Config) -> Option<Arc<dyn TraceCollector>> {
    HttpTraceCollector::from_config(config)
        .map(|collector| Arc::new(collector) as Arc<dyn TraceCollector>)
}

#[cfg(not(feature = "remote-log"))]
fn default_collector(_config: &Config) -> Option<Arc<dyn TraceCollector>> {
    None
}

/// Records one structured trace per top-level run.
pub struct ExecutionTracker {
    state: Mutex<TrackState>,
    collector: Option<Arc<dyn TraceCollector>>,
    last_log_id: RwLock<Option<String>>,
    publish_count: AtomicUsize,
}

impl fmt::Debug for ExecutionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionTracker")
            .field("steps", &self.state.lock().steps.len())
            .field("collector", &self.collector.is_some())
            .field("publish_count", &self.publish_count())
            .finish_non_exhaustive()
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionTracker {
    /// Creates a tracker that publishes nowhere.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackState::new()),
            collector: None,
            last_log_id: RwLock::new(None),
            publish_count: AtomicUsize::new(0),
        }
    }

    /// Creates a tracker shipping traces to the configured log server.
    ///
    /// Without an API key (or without the `remote-log` feature) publishing
    /// only finalizes the trace locally.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collector: default_collector(config),
            ..Self::new()
        }
    }

    /// Sets the collector traces are published to.
    #[must_use]
    pub fn with_collector(mut self, collector: Arc<dyn TraceCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Resets the trace for a new run.
    pub fn start_new_track(
        &self,
        conversation_id: Uuid,
        query: impl Into<String>,
        output_type: Option<OutputType>,
    ) {
        let mut state = self.state.lock();
        *state = TrackState::new();
        state.conversation_id = Some(conversation_id);
        state.query = query.into();
        state.output_type = output_type;
    }

    /// Records the skills available to the run.
    pub fn add_skills(&self, skills: &SkillsManager) {
        let names = skills.names().into_iter().map(serde_json::Value::String);
        self.state.lock().skills = names.collect();
    }

    /// Records the schema heads of the bound data sources.
    pub fn add_data_sources(&self, sources: &[Arc<dyn DataConnector>]) {
        let heads = sources
            .iter()
            .map(|source| {
                let schema = source.schema();
                json!({
                    "name": schema.name,
                    "columns": schema.columns,
                    "head": schema.head,
                    "rows": schema.row_count,
                })
            })
            .collect();
        self.state.lock().dataframes = heads;
    }

    /// Appends a step record.
    pub fn add_step(&self, step: TrackedStep) {
        self.state.lock().steps.push(step);
    }

    /// Sets the run outcome.
    pub fn set_success(&self, success: bool) {
        self.state.lock().success = success;
    }

    /// The run outcome so far.
    #[must_use]
    pub fn success(&self) -> bool {
        self.state.lock().success
    }

    /// Records the final response. Readable plot files are embedded as
    /// base64 data URIs.
    pub async fn set_final_response(&self, response: &ChatResult) {
        let value = match (response.result_type.as_str(), &response.value) {
            ("plot", serde_json::Value::String(path)) => tokio::fs::read(path).await.map_or_else(
                |_| response.value.clone(),
                |bytes| {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    json!(format!("data:image/png;base64,{encoded}"))
                },
            ),
            _ => response.value.clone(),
        };
        self.state.lock().response = Some(json!({
            "type": response.result_type,
            "value": value,
        }));
    }

    /// A copy of the recorded steps.
    #[must_use]
    pub fn steps(&self) -> Vec<TrackedStep> {
        self.state.lock().steps.clone()
    }

    /// Builds the trace document.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        let state = self.state.lock();
        json!({
            "query_info": {
                "conversation_id": state.conversation_id.map(|id| id.to_string()),
                "instance": "chatflow",
                "query": state.query,
                "output_type": state.output_type.map(OutputType::as_str),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "skills": state.skills,
            "dataframes": state.dataframes,
            "steps": state.steps,
            "response": state.response,
            "started_at": state.started_at.to_rfc3339(),
            "execution_time": state.started.elapsed().as_secs_f64(),
            "success": state.success,
        })
    }

    /// Finalizes the trace and ships it to the collector, if any.
    ///
    /// Collector failures are logged and never propagated.
    pub async fn publish(&self) -> Option<String> {
        self.publish_count.fetch_add(1, Ordering::SeqCst);
        let summary = self.summary();
        tracing::debug!(
            steps = summary["steps"].as_array().map_or(0, Vec::len),
            success = summary["success"].as_bool().unwrap_or(false),
            "Publishing execution trace"
        );

        let collector = self.collector.as_ref()?;
        match collector.submit(&summary).await {
            Ok(Some(log_id)) => {
                *self.last_log_id.write() = Some(log_id.clone());
                Some(log_id)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to publish execution trace");
                None
            }
        }
    }

    /// The identifier the collector returned for the last published trace.
    #[must_use]
    pub fn last_log_id(&self) -> Option<String> {
        self.last_log_id.read().clone()
    }

    /// How many times [`Self::publish`] has been called.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }
}
