//! Fingerprint to code cache.
//!
//! A cache hit lets a run skip prompt rendering and code generation. The
//! engine only needs `get`/`set`; eviction is left to implementations.

use crate::context::PipelineContext;
use crate::errors::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Storage for generated code keyed by a context fingerprint.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets the code stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;

    /// Derives the key for the current state of `ctx`.
    fn get_cache_key(&self, ctx: &PipelineContext) -> String {
        fingerprint(ctx)
    }
}

/// Deterministic fingerprint of everything that shapes generated code.
///
/// Covers the current query, the conversation window, the column hashes of
/// every data source, the requested output type, direct SQL mode, the
/// plotting library and the registered skill names.
#[must_use]
pub fn fingerprint(ctx: &PipelineContext) -> String {
    let config = ctx.config();
    let (query, conversation) = {
        let memory = ctx.memory();
        (
            memory.last_query().unwrap_or_default().to_string(),
            memory.get_conversation(None),
        )
    };
    let columns = ctx
        .data_sources()
        .iter()
        .map(|s| s.column_hash())
        .collect::<Vec<_>>()
        .join(",");
    let output_type = ctx.output_type().map(|t| t.as_str()).unwrap_or_default();
    let skills = ctx.skills().names().join(",");
    let mode = if config.direct_sql { "direct_sql" } else { "" };

    let mut hasher = Sha256::new();
    for part in [
        query.as_str(),
        conversation.as_str(),
        columns.as_str(),
        output_type,
        mode,
        config.viz_library(),
        skills.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("chat:{}", hex::encode(hasher.finalize()))
}

/// Process-wide cache on a concurrent map. Last writer wins.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, String>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::OUTPUT_TYPE;
    use crate::testing::{ScriptedExecutor, ScriptedLlm, StaticConnector};
    use std::sync::Arc;

    fn context(config: Config) -> PipelineContext {
        PipelineContext::builder(Arc::new(ScriptedLlm::new()), Arc::new(ScriptedExecutor::new()))
            .data_source(Arc::new(StaticConnector::dataframe("sales", &["region", "revenue"])))
            .config(config)
            .build()
    }

    #[tokio::test]
    async fn test_in_memory_cache_roundtrip() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "print(1)").await.unwrap();
        cache.set("k", "print(2)").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("print(2)"));
        assert_eq!(cache.len(), 1);

        cache.delete("k").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_safe() {
        let cache = Arc::new(InMemoryCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.set(&format!("k{}", i % 4), &i.to_string()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let ctx = context(Config::default());
        ctx.memory_mut().add("avg revenue", true);
        assert_eq!(fingerprint(&ctx), fingerprint(&ctx));
        assert!(fingerprint(&ctx).starts_with("chat:"));
    }

    #[test]
    fn test_fingerprint_tracks_query_and_output_type() {
        let ctx = context(Config::default());
        ctx.memory_mut().add("avg revenue", true);
        let first = fingerprint(&ctx);

        ctx.add(OUTPUT_TYPE, serde_json::json!("number"));
        let typed = fingerprint(&ctx);
        assert_ne!(first, typed);

        ctx.memory_mut().clear();
        ctx.memory_mut().add("max revenue", true);
        assert_ne!(typed, fingerprint(&ctx));
    }

    #[test]
    fn test_fingerprint_hashes_query_outside_window() {
        let avg = context(Config::default().with_memory_size(1));
        let max = context(Config::default().with_memory_size(1));
        for (ctx, query) in [(&avg, "avg revenue"), (&max, "max revenue")] {
            ctx.memory_mut().add(query, true);
            ctx.memory_mut().add("42", false);
        }

        assert_eq!(
            avg.memory().get_conversation(None),
            max.memory().get_conversation(None)
        );
        assert_ne!(fingerprint(&avg), fingerprint(&max));
    }

    #[test]
    fn test_fingerprint_tracks_config() {
        let plain = context(Config::default());
        let sql = context(Config::default().with_direct_sql(true));
        plain.memory_mut().add("q", true);
        sql.memory_mut().add("q", true);
        assert_ne!(fingerprint(&plain), fingerprint(&sql));
    }
}
