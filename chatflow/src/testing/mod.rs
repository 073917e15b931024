//! Testing utilities for chatflow pipelines.
//!
//! This module provides:
//! - Scripted LLM, executor, connector, observer and collector doubles
//! - A fixture wiring them into a chat pipeline
//! - Assertions on replies and traces

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_answer, assert_error_reply, assert_published, assert_step_absent,
    assert_step_sequence,
};
pub use fixtures::TestFixture;
pub use mocks::{
    ObservedEvent, RecordingCollector, RecordingObserver, ScriptedExecutor, ScriptedLlm,
    StaticConnector, DEFAULT_CODE,
};
