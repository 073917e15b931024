//! Cache lookup and population.

use super::Step;
use crate::context::{PipelineContext, FOUND_IN_CACHE, LAST_CODE_GENERATED};
use crate::core::{StepKind, StepOutput, StepValue};
use crate::errors::Result;
use async_trait::async_trait;
use serde_json::json;

/// Looks up code for the current fingerprint.
///
/// On a hit it sets `found_in_cache` and `last_code_generated` and outputs the
/// cached code. A miss, a disabled cache or a failing backend pass the input
/// through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheLookup;

impl CacheLookup {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for CacheLookup {
    fn kind(&self) -> StepKind {
        StepKind::CacheLookup
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let Some(cache) = ctx.cache() else {
            return Ok(StepOutput::ok(input, "Cache Disabled"));
        };

        let key = cache.get_cache_key(ctx);
        match cache.get(&key).await {
            Ok(Some(code)) if !code.trim().is_empty() => {
                tracing::info!(cache_key = %key, "Using cached response");
                ctx.add(FOUND_IN_CACHE, json!(true));
                ctx.add(LAST_CODE_GENERATED, json!(code));
                Ok(StepOutput::ok(StepValue::Code(code.clone()), "Cache Hit")
                    .with_metadata("code", json!(code)))
            }
            Ok(_) => {
                tracing::debug!(cache_key = %key, "Cache miss");
                Ok(StepOutput::ok(input, "Cache Miss"))
            }
            Err(error) => {
                tracing::warn!(cache_key = %key, error = %error, "Cache lookup failed, treating as miss");
                Ok(StepOutput::ok(input, "Cache Miss"))
            }
        }
    }
}

/// Stores freshly generated code under the current fingerprint.
#[derive(Debug, Default, Clone, Copy)]
pub struct CachePopulation;

impl CachePopulation {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for CachePopulation {
    fn kind(&self) -> StepKind {
        StepKind::CachePopulation
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let code = input.into_code()?;

        let Some(cache) = ctx.cache() else {
            return Ok(StepOutput::ok(StepValue::Code(code), "Cache Disabled"));
        };

        let key = cache.get_cache_key(ctx);
        if let Err(error) = cache.set(&key, &code).await {
            tracing::warn!(cache_key = %key, error = %error, "Failed to populate cache");
            return Ok(StepOutput::unsuccessful(
                StepValue::Code(code),
                "Cache Population Failed",
            ));
        }

        tracing::debug!(cache_key = %key, "Cached generated code");
        Ok(StepOutput::ok(StepValue::Code(code), "Prompt Cached Successfully"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::{ScriptedExecutor, ScriptedLlm};
    use std::sync::Arc;

    fn context(config: Config) -> PipelineContext {
        let ctx = PipelineContext::builder(
            Arc::new(ScriptedLlm::new()),
            Arc::new(ScriptedExecutor::new()),
        )
        .config(config)
        .build();
        ctx.memory_mut().add("avg revenue", true);
        ctx
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let ctx = context(Config::default());

        let miss = CacheLookup.execute(StepValue::Empty, &ctx).await.unwrap();
        assert_eq!(miss.message, "Cache Miss");
        assert!(!ctx.found_in_cache());

        CachePopulation
            .execute(StepValue::Code("x = 1".into()), &ctx)
            .await
            .unwrap();

        let hit = CacheLookup.execute(StepValue::Empty, &ctx).await.unwrap();
        assert_eq!(hit.message, "Cache Hit");
        assert_eq!(hit.value.as_code(), Some("x = 1"));
        assert!(ctx.found_in_cache());
        assert_eq!(ctx.last_code_generated().as_deref(), Some("x = 1"));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let ctx = context(Config::default().with_cache(false));
        assert!(ctx.cache().is_none());

        CachePopulation
            .execute(StepValue::Code("x = 1".into()), &ctx)
            .await
            .unwrap();
        let output = CacheLookup.execute(StepValue::Empty, &ctx).await.unwrap();
        assert!(matches!(output.value, StepValue::Empty));
        assert!(!ctx.found_in_cache());
    }
}
