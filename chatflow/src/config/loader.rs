//! Discovery and loading of `chatflow.json`.

use super::{Config, LogServerConfig};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for.
pub const CONFIG_FILE_NAME: &str = "chatflow.json";

/// Returns the closest `chatflow.json` at or above `start`.
#[must_use]
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Loads the configuration relative to the current directory.
///
/// See [`load_config_from`].
pub fn load_config(overrides: Option<serde_json::Value>) -> Result<Config> {
    let cwd = std::env::current_dir().context("failed to resolve the current directory")?;
    load_config_from(&cwd, overrides)
}

/// Loads the closest `chatflow.json` walking up from `dir` and merges
/// `overrides` on top of it.
///
/// A missing file yields the defaults. Top-level keys in `overrides` replace
/// the file's keys. When no `log_server` is configured, one is read from the
/// environment.
pub fn load_config_from(dir: &Path, overrides: Option<serde_json::Value>) -> Result<Config> {
    let mut merged = serde_json::Map::new();

    if let Some(path) = find_config_file(dir) {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        match value {
            serde_json::Value::Object(map) => merged.extend(map),
            _ => anyhow::bail!("{} must contain a JSON object", path.display()),
        }
        tracing::debug!(path = %path.display(), "Loaded configuration file");
    } else {
        tracing::debug!(dir = %dir.display(), "No {} found, using defaults", CONFIG_FILE_NAME);
    }

    match overrides {
        Some(serde_json::Value::Object(map)) => merged.extend(map),
        Some(serde_json::Value::Null) | None => {}
        Some(_) => anyhow::bail!("configuration overrides must be a JSON object"),
    }

    let mut config: Config = serde_json::from_value(serde_json::Value::Object(merged))
        .context("invalid chatflow configuration")?;

    if config.log_server.is_none() {
        config.log_server = LogServerConfig::from_env();
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(dir.path(), None).unwrap();
        assert_eq!(config.max_retries, 3);
        assert!(config.enable_cache);
    }

    #[test]
    fn test_file_in_parent_directory_is_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"max_retries": 5, "enable_cache": false}"#,
        )
        .unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_file(&nested),
            Some(dir.path().join(CONFIG_FILE_NAME))
        );
        let config = load_config_from(&nested, None).unwrap();
        assert_eq!(config.max_retries, 5);
        assert!(!config.enable_cache);
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"max_retries": 5, "direct_sql": true}"#,
        )
        .unwrap();

        let config =
            load_config_from(dir.path(), Some(json!({"max_retries": 1}))).unwrap();
        assert_eq!(config.max_retries, 1);
        assert!(config.direct_sql);
    }

    #[test]
    fn test_invalid_json_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").unwrap();

        let err = load_config_from(dir.path(), None).unwrap_err();
        assert!(format!("{err:#}").contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_non_object_overrides_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_from(dir.path(), Some(json!([1, 2]))).is_err());
    }
}
