//! Engine configuration.
//!
//! [`Config`] is plain data: every field has a serde default so a partial
//! `chatflow.json` (or an empty one) deserializes into a usable value.

mod loader;

pub use loader::{find_config_file, load_config, load_config_from, CONFIG_FILE_NAME};

use crate::errors::ChatflowError;
use crate::pipeline::BackoffConfig;
use serde::{Deserialize, Serialize};

/// Environment variable holding the trace collector base URL.
pub const API_URL_ENV: &str = "CHATFLOW_API_URL";
/// Environment variable holding the trace collector API key.
pub const API_KEY_ENV: &str = "CHATFLOW_API_KEY";

const DEFAULT_SERVER_URL: &str = "https://api.domer.ai";

/// How strictly queries and generated code are screened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Keyword screening of queries and import whitelisting of code.
    #[default]
    Standard,
    /// No screening at all.
    None,
    /// Same keyword screening as `Standard`.
    Advanced,
}

impl SecurityLevel {
    /// Whether any screening is active.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Where execution traces are shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogServerConfig {
    /// Base URL of the collector.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Bearer token. Publishing is a no-op without it.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl LogServerConfig {
    /// Creates a collector configuration.
    #[must_use]
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: Some(api_key.into()),
        }
    }

    /// Reads `CHATFLOW_API_URL` / `CHATFLOW_API_KEY`.
    ///
    /// Returns `None` when no API key is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())?;
        let server_url =
            std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        Some(Self {
            server_url,
            api_key: Some(api_key),
        })
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_max_retries() -> usize {
    3
}

const fn default_memory_size() -> usize {
    10
}

/// Configuration shared by every step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Promote prompts and generated code to `info` level logs.
    #[serde(default)]
    pub verbose: bool,
    /// Attach a cache to the pipeline context.
    #[serde(default = "default_true")]
    pub enable_cache: bool,
    /// Route execution and cleaning failures through error correction.
    #[serde(default = "default_true")]
    pub use_error_correction_framework: bool,
    /// Shared per-run budget of correction cycles and re-attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Generated code queries SQL sources through `execute_sql_query`.
    #[serde(default)]
    pub direct_sql: bool,
    /// Plotting library named in prompts. Empty means matplotlib.
    #[serde(default)]
    pub data_viz_library: String,
    /// Screening level.
    #[serde(default)]
    pub security: SecurityLevel,
    /// Extra modules generated code may import.
    #[serde(default)]
    pub custom_whitelisted_dependencies: Vec<String>,
    /// Number of conversation messages kept in prompts and cache keys. Zero
    /// keeps the whole conversation.
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
    /// Delay between re-attempts of transient LLM failures.
    #[serde(default)]
    pub llm_backoff: BackoffConfig,
    /// Trace collector settings.
    #[serde(default)]
    pub log_server: Option<LogServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            enable_cache: true,
            use_error_correction_framework: true,
            max_retries: default_max_retries(),
            direct_sql: false,
            data_viz_library: String::new(),
            security: SecurityLevel::default(),
            custom_whitelisted_dependencies: Vec::new(),
            memory_size: default_memory_size(),
            llm_backoff: BackoffConfig::default(),
            log_server: None,
        }
    }
}

impl Config {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the cache.
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    /// Enables or disables error correction.
    #[must_use]
    pub const fn with_error_correction(mut self, enabled: bool) -> Self {
        self.use_error_correction_framework = enabled;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enables direct SQL mode.
    #[must_use]
    pub const fn with_direct_sql(mut self, direct_sql: bool) -> Self {
        self.direct_sql = direct_sql;
        self
    }

    /// Sets the plotting library.
    #[must_use]
    pub fn with_data_viz_library(mut self, library: impl Into<String>) -> Self {
        self.data_viz_library = library.into();
        self
    }

    /// Sets the security level.
    #[must_use]
    pub const fn with_security(mut self, security: SecurityLevel) -> Self {
        self.security = security;
        self
    }

    /// Whitelists additional modules.
    #[must_use]
    pub fn with_whitelisted_dependencies(
        mut self,
        deps: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.custom_whitelisted_dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets how many messages of memory are kept.
    #[must_use]
    pub const fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    /// Sets the LLM re-attempt backoff.
    #[must_use]
    pub const fn with_llm_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.llm_backoff = backoff;
        self
    }

    /// Sets the trace collector.
    #[must_use]
    pub fn with_log_server(mut self, log_server: LogServerConfig) -> Self {
        self.log_server = Some(log_server);
        self
    }

    /// Enables verbose logging.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The plotting library used in prompts.
    #[must_use]
    pub fn viz_library(&self) -> &str {
        if self.data_viz_library.is_empty() {
            "matplotlib"
        } else {
            &self.data_viz_library
        }
    }

    /// Checks field combinations that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty collector URL.
    pub fn validate(&self) -> Result<(), ChatflowError> {
        if let Some(ref server) = self.log_server {
            if server.server_url.trim().is_empty() {
                return Err(ChatflowError::InvalidConfig(
                    "log_server.server_url cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.enable_cache);
        assert!(config.use_error_correction_framework);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.security, SecurityLevel::Standard);
        assert_eq!(config.viz_library(), "matplotlib");
    }

    #[test]
    fn test_empty_json_matches_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_security_none_deserializes() {
        let config: Config = serde_json::from_str(r#"{"security": "none"}"#).unwrap();
        assert_eq!(config.security, SecurityLevel::None);
        assert!(!config.security.is_enabled());
    }

    #[test]
    fn test_builders() {
        let config = Config::new()
            .with_cache(false)
            .with_max_retries(0)
            .with_direct_sql(true)
            .with_data_viz_library("plotly")
            .with_whitelisted_dependencies(["polars"]);

        assert!(!config.enable_cache);
        assert_eq!(config.max_retries, 0);
        assert!(config.direct_sql);
        assert_eq!(config.viz_library(), "plotly");
        assert_eq!(config.custom_whitelisted_dependencies, vec!["polars".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_server_url() {
        let config = Config::new().with_log_server(LogServerConfig::new("  ", "key"));
        assert!(matches!(config.validate(), Err(ChatflowError::InvalidConfig(_))));
    }
}
