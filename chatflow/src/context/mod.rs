//! Context management for pipeline execution.
//!
//! This module provides:
//! - The shared [`PipelineContext`] every step receives
//! - The intermediate value bag steps communicate through
//! - Conversation memory, message persistence and skills
//! - Typed inputs of the chat, execution and correction pipelines

mod bags;
mod execution;
mod inputs;
mod memory;
mod skills;

pub use bags::IntermediateValues;
pub use execution::{
    PipelineContext, PipelineContextBuilder, FOUND_IN_CACHE, LAST_CODE_CLEANED,
    LAST_CODE_EXECUTED, LAST_CODE_GENERATED, LAST_PROMPT_ID, LAST_RESULT, OUTPUT_TYPE,
};
pub use inputs::{ChatPipelineInput, CodeExecutionPipelineInput, ErrorCorrectionInput};
pub use memory::{InMemoryMessageStore, Memory, Message, MessageStore, Role, StoredMessage};
pub use skills::{Skill, SkillsManager};
