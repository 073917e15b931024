//! # Chatflow
//!
//! A query-to-answer pipeline engine over tabular data sources.
//!
//! Chatflow turns a natural-language question into code with an LLM, runs
//! that code against the bound data sources and returns a typed answer. It
//! provides:
//!
//! - **Step pipelines**: ordered steps with skip predicates and per-step retry policies
//! - **Error correction**: failed code is sent back to the LLM with the error, within a per-run budget
//! - **Caching**: generated code is reused for identical queries over the same schema
//! - **Execution traces**: every run is tracked and published to an optional collector
//! - **Agent facade**: conversation memory, query screening and auxiliary LLM questions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatflow::prelude::*;
//!
//! let agent = Agent::builder(llm, executor)
//!     .data_source(sales)
//!     .config(load_config(None)?)
//!     .build()?;
//!
//! match agent.chat("Which country has the highest revenue?", None).await {
//!     ChatReply::Answer(answer) => println!("{}", answer.to_text()),
//!     other => eprintln!("{}", other.to_text()),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agent;
pub mod cache;
pub mod chat;
pub mod config;
pub mod connectors;
pub mod context;
pub mod core;
pub mod errors;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod steps;
pub mod testing;
pub mod tracker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{Agent, AgentBuilder, SecurityEvaluator};
    pub use crate::cache::{Cache, InMemoryCache};
    pub use crate::chat::{
        ErrorCorrectionPipeline, GenerateChatPipeline, Judge, PipelineKind, PipelineRegistry,
    };
    pub use crate::config::{load_config, Config, LogServerConfig, SecurityLevel};
    pub use crate::connectors::{CodeExecutor, DataConnector, DataSchema, DataSource, SqlCredentials};
    pub use crate::context::{
        ChatPipelineInput, CodeExecutionPipelineInput, InMemoryMessageStore, Memory,
        MessageStore, PipelineContext, Skill, SkillsManager,
    };
    pub use crate::core::{ChatReply, ChatResult, ExecutionResult, OutputType, StepKind};
    pub use crate::errors::{ChatflowError, ErrorKind, LlmError, Result};
    pub use crate::llm::LlmClient;
    pub use crate::observability::{init_json_tracing, init_tracing};
    pub use crate::pipeline::{BackoffConfig, PipelineObserver};
    pub use crate::prompts::{Prompt, PromptKind};
    pub use crate::tracker::{ExecutionTracker, TraceCollector};
}
