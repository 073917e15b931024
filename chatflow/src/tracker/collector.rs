//! Trace collectors.

use crate::errors::Result;
use async_trait::async_trait;

/// Receives finalized execution traces.
#[async_trait]
pub trait TraceCollector: Send + Sync {
    /// Ships a trace, returning the collector's identifier for it.
    async fn submit(&self, summary: &serde_json::Value) -> Result<Option<String>>;
}

#[cfg(feature = "remote-log")]
pub use http::HttpTraceCollector;

#[cfg(feature = "remote-log")]
mod http {
    use super::TraceCollector;
    use crate::config::{Config, LogServerConfig};
    use crate::errors::{ChatflowError, Result};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Deserialize)]
    struct AddLogResponse {
        data: Option<AddLogData>,
    }

    #[derive(Deserialize)]
    struct AddLogData {
        log_id: Option<String>,
    }

    /// POSTs traces to `{server_url}/api/log/add` with a bearer token.
    #[derive(Debug, Clone)]
    pub struct HttpTraceCollector {
        client: reqwest::Client,
        server_url: String,
        api_key: String,
    }

    impl HttpTraceCollector {
        /// Creates a collector.
        #[must_use]
        pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default();
            Self {
                client,
                server_url: server_url.into().trim_end_matches('/').to_string(),
                api_key: api_key.into(),
            }
        }

        /// Builds a collector from the config, or the environment when the
        /// config names no log server. `None` without an API key.
        #[must_use]
        pub fn from_config(config: &Config) -> Option<Self> {
            let server = config.log_server.clone().or_else(LogServerConfig::from_env)?;
            let api_key = server.api_key.filter(|key| !key.is_empty())?;
            Some(Self::new(server.server_url, api_key))
        }

        fn endpoint(&self) -> String {
            format!("{}/api/log/add", self.server_url)
        }
    }

    #[async_trait]
    impl TraceCollector for HttpTraceCollector {
        async fn submit(&self, summary: &serde_json::Value) -> Result<Option<String>> {
            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "json_log": summary }))
                .send()
                .await
                .map_err(|e| ChatflowError::internal(format!("Failed to send trace: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ChatflowError::internal(format!(
                    "Log server error ({status}): {body}"
                )));
            }

            let body = response
                .json::<AddLogResponse>()
                .await
                .map_err(|e| ChatflowError::internal(format!("Failed to parse log server response: {e}")))?;
            Ok(body.data.and_then(|data| data.log_id))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_endpoint_trims_trailing_slash() {
            let collector = HttpTraceCollector::new("https://logs.example.com/", "key");
            assert_eq!(collector.endpoint(), "https://logs.example.com/api/log/add");
        }

        #[test]
        fn test_requires_api_key() {
            let config = Config::default().with_log_server(LogServerConfig {
                server_url: "https://logs.example.com".into(),
                api_key: None,
            });
            assert!(HttpTraceCollector::from_config(&config).is_none());

            let config = Config::default()
                .with_log_server(LogServerConfig::new("https://logs.example.com", "key"));
            assert!(HttpTraceCollector::from_config(&config).is_some());
        }
    }
}
