//! Pipeline building and execution.
//!
//! This module provides:
//! - Step specifications with skip predicates and observer points
//! - The sequential [`Pipeline`] engine
//! - Retry policies, the per-run retry budget and backoff

mod engine;
mod observer;
mod retry;
mod spec;

#[cfg(test)]
mod engine_tests;

pub use engine::{CodeCorrector, Pipeline};
pub use observer::{NoOpObserver, ObservePoint, PipelineObserver};
pub use retry::{BackoffConfig, BackoffStrategy, JitterStrategy, RetryBudget, RetryPolicy};
pub use spec::{SkipPredicate, StepSpec};
