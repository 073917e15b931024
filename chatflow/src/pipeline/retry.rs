//! Retry policies, the per-run retry budget and backoff delays.
//!
//! Every recovery the engine performs (an error-correction cycle or a plain
//! re-attempt) draws one unit from a single [`RetryBudget`] shared by the
//! whole run, so `max_retries` bounds the run rather than each step.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the engine does when a step returns a retryable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Propagate the error.
    #[default]
    Never,
    /// Run the step again with the same input after a backoff delay.
    Reattempt,
    /// Ask the code corrector for new code and run the step on it.
    ErrorCorrection,
}

/// Attempt counter shared across one top-level run.
#[derive(Debug, Default)]
pub struct RetryBudget {
    used: AtomicUsize,
}

impl RetryBudget {
    /// Creates a full budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes one unit if fewer than `max` were used.
    ///
    /// Returns the 1-based number of the retry just granted.
    pub fn try_acquire(&self, max: usize) -> Option<usize> {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < max).then_some(used + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Units used so far.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    /// Refills the budget.
    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Delay between re-attempts of a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 5000,
            strategy: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl BackoffConfig {
    /// A backoff that never waits.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 0,
            strategy: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculates the delay before re-attempt number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.strategy {
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent)).min(max)
            }
            BackoffStrategy::Linear => {
                let factor = u64::try_from(attempt).unwrap_or(u64::MAX).saturating_add(1);
                base.saturating_mul(factor).min(max)
            }
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_bounded() {
        let budget = RetryBudget::new();
        assert_eq!(budget.try_acquire(2), Some(1));
        assert_eq!(budget.try_acquire(2), Some(2));
        assert_eq!(budget.try_acquire(2), None);
        assert_eq!(budget.used(), 2);

        budget.reset();
        assert_eq!(budget.try_acquire(2), Some(1));
    }

    #[test]
    fn test_zero_budget_grants_nothing() {
        let budget = RetryBudget::new();
        assert_eq!(budget.try_acquire(0), None);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_backoff_default() {
        let config = BackoffConfig::default();
        assert_eq!(config.strategy, BackoffStrategy::Exponential);
        assert_eq!(config.jitter, JitterStrategy::Full);
    }

    #[test]
    fn test_exponential_no_jitter() {
        let config = BackoffConfig::default()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_no_jitter() {
        let config = BackoffConfig::default()
            .with_base_delay_ms(100)
            .with_strategy(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = BackoffConfig::default()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.delay_for(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_full_jitter_within_bounds() {
        let config = BackoffConfig::default().with_base_delay_ms(100);
        for _ in 0..50 {
            assert!(config.delay_for(1) <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_immediate_never_waits() {
        assert_eq!(BackoffConfig::immediate().delay_for(5), Duration::ZERO);
    }
}
