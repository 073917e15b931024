//! Optional acceptance gate for generated code.

use crate::errors::Result;
use async_trait::async_trait;

/// Decides whether generated code answers the query before it runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Judge: Send + Sync {
    /// Returns `true` to accept `code` for `query`.
    async fn evaluate(&self, query: &str, code: &str) -> Result<bool>;
}
