//! Error types for the chatflow engine.
//!
//! Every step returns `Result<_, ChatflowError>`. The engine asks an error for
//! its [`ErrorKind`] to pick a correction prompt and for [`ChatflowError::is_retryable`]
//! to decide whether the shared retry budget may be spent on it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ChatflowError> = std::result::Result<T, E>;

/// The main error type for chatflow operations.
#[derive(Debug, Error)]
pub enum ChatflowError {
    /// The pipeline input or configuration is unusable. Never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The user query was rejected before any LLM call.
    #[error("{0}")]
    MaliciousQuery(String),

    /// Generated code uses a forbidden module or builtin.
    #[error("Generated code contains restricted operations: {0}")]
    MaliciousCode(String),

    /// The executed result does not have the requested output type.
    #[error("Invalid output type: expected `{expected}`, got `{actual}`")]
    InvalidOutputType {
        /// The requested output type.
        expected: String,
        /// The type actually produced.
        actual: String,
    },

    /// Direct SQL mode requires generated code to call `execute_sql_query`.
    #[error("The generated code must use the `execute_sql_query` function to query the data")]
    ExecuteSqlQueryNotUsed,

    /// The LLM answer did not contain any code.
    #[error("No code found in the response: {0}")]
    NoCodeFound(String),

    /// Running the generated code failed.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The LLM collaborator failed.
    #[error("{0}")]
    Llm(#[from] LlmError),

    /// The cache backend failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ChatflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failures reported by an LLM client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// The call timed out.
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    /// The credentials were rejected.
    #[error("LLM authorization failed: {0}")]
    Authorization(String),

    /// The provider returned an error response.
    #[error("LLM API error: {0}")]
    Api(String),

    /// The prompt exceeded the model context window.
    #[error("LLM token limit exceeded: {0}")]
    TokenLimit(String),

    /// The answer could not be interpreted.
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Fieldless tag for an error, used for table-driven dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`ChatflowError::InvalidConfig`].
    InvalidConfig,
    /// See [`ChatflowError::MaliciousQuery`].
    MaliciousQuery,
    /// See [`ChatflowError::MaliciousCode`].
    MaliciousCode,
    /// See [`ChatflowError::InvalidOutputType`].
    InvalidOutputType,
    /// See [`ChatflowError::ExecuteSqlQueryNotUsed`].
    ExecuteSqlQueryNotUsed,
    /// See [`ChatflowError::NoCodeFound`].
    NoCodeFound,
    /// See [`ChatflowError::Execution`].
    Execution,
    /// See [`ChatflowError::Llm`].
    Llm,
    /// See [`ChatflowError::Cache`].
    Cache,
    /// See [`ChatflowError::Serialization`].
    Serialization,
    /// See [`ChatflowError::Io`].
    Io,
    /// See [`ChatflowError::Internal`].
    Internal,
}

impl ErrorKind {
    /// Returns the snake_case name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidConfig => "invalid_config",
            Self::MaliciousQuery => "malicious_query",
            Self::MaliciousCode => "malicious_code",
            Self::InvalidOutputType => "invalid_output_type",
            Self::ExecuteSqlQueryNotUsed => "execute_sql_query_not_used",
            Self::NoCodeFound => "no_code_found",
            Self::Execution => "execution",
            Self::Llm => "llm",
            Self::Cache => "cache",
            Self::Serialization => "serialization",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatflowError {
    /// Creates an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the tag of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::MaliciousQuery(_) => ErrorKind::MaliciousQuery,
            Self::MaliciousCode(_) => ErrorKind::MaliciousCode,
            Self::InvalidOutputType { .. } => ErrorKind::InvalidOutputType,
            Self::ExecuteSqlQueryNotUsed => ErrorKind::ExecuteSqlQueryNotUsed,
            Self::NoCodeFound(_) => ErrorKind::NoCodeFound,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Llm(_) => ErrorKind::Llm,
            Self::Cache(_) => ErrorKind::Cache,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a failed step may spend retry budget on this error.
    ///
    /// Input validation, malicious queries and rejected credentials are fatal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig(_)
                | Self::MaliciousQuery(_)
                | Self::Llm(LlmError::Authorization(_))
        )
    }

    /// Renders a traceback-like report used inside correction prompts.
    #[must_use]
    pub fn report(&self) -> String {
        let mut report = format!("{}: {self}", self.kind());
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            report.push_str("\nCaused by: ");
            report.push_str(&cause.to_string());
            source = cause.source();
        }
        report
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "kind".to_string(),
            serde_json::Value::String(self.kind().as_str().to_string()),
        );
        map.insert("message".to_string(), serde_json::Value::String(self.to_string()));
        map.insert("retryable".to_string(), serde_json::Value::Bool(self.is_retryable()));
        map
    }
}
