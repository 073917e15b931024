//! Static screening and sanitizing of generated code.

use super::{log_detail, Step};
use crate::config::Config;
use crate::context::{PipelineContext, LAST_CODE_CLEANED};
use crate::core::{StepKind, StepOutput, StepValue};
use crate::errors::{ChatflowError, Result};
use crate::llm::extract_code;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

/// Modules generated code may import without extra configuration.
pub const WHITELISTED_LIBRARIES: &[&str] = &[
    "pandas",
    "numpy",
    "matplotlib",
    "seaborn",
    "plotly",
    "datetime",
    "json",
    "math",
    "statistics",
    "re",
    "collections",
    "scipy",
    "sklearn",
    "statsmodels",
    "base64",
];

static IMPORT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:from\s+([A-Za-z_][\w.]*)\s+import\b|import\s+([^\n#]+))").ok()
});

static DANGEROUS_BUILTIN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|[^.\w])(eval|exec|open|__import__|compile)\s*\(").ok()
});

static SYSTEM_ACCESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|[^.\w])(os|subprocess|sys|shutil)\.\w").ok());

static DFS_REDEFINITION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*dfs\s*=").ok());

fn imported_roots(code: &str) -> Vec<String> {
    let Some(import) = IMPORT.as_ref() else {
        return Vec::new();
    };

    let mut roots = Vec::new();
    for caps in import.captures_iter(code) {
        if let Some(module) = caps.get(1) {
            roots.push(module.as_str().to_string());
        } else if let Some(list) = caps.get(2) {
            for item in list.as_str().split(',') {
                if let Some(module) = item.split_whitespace().next() {
                    roots.push(module.to_string());
                }
            }
        }
    }

    roots
        .into_iter()
        .filter_map(|m| m.split('.').next().map(ToString::to_string))
        .filter(|m| !m.is_empty())
        .collect()
}

fn check_security(code: &str, config: &Config) -> Result<()> {
    for module in imported_roots(code) {
        let allowed = WHITELISTED_LIBRARIES.contains(&module.as_str())
            || config
                .custom_whitelisted_dependencies
                .iter()
                .any(|dep| dep == &module);
        if !allowed {
            return Err(ChatflowError::MaliciousCode(format!(
                "Generated code includes import of {module} which is not in whitelist."
            )));
        }
    }

    if let Some(caps) = DANGEROUS_BUILTIN.as_ref().and_then(|re| re.captures(code)) {
        return Err(ChatflowError::MaliciousCode(format!(
            "use of builtin `{}` is not allowed",
            &caps[1]
        )));
    }

    if let Some(caps) = SYSTEM_ACCESS.as_ref().and_then(|re| re.captures(code)) {
        return Err(ChatflowError::MaliciousCode(format!(
            "access to `{}` is not allowed",
            &caps[1]
        )));
    }

    Ok(())
}

fn is_stripped_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("plt.show(")
        || DFS_REDEFINITION
            .as_ref()
            .is_some_and(|re| re.is_match(line))
}

/// Cleans an LLM answer into runnable code.
///
/// Extracts the fenced code block, screens it unless security is disabled,
/// requires `execute_sql_query` in direct SQL mode, then drops `plt.show()`
/// calls and redefinitions of `dfs`.
///
/// # Errors
///
/// `NoCodeFound`, `MaliciousCode` or `ExecuteSqlQueryNotUsed`.
pub fn clean_code(answer: &str, config: &Config) -> Result<String> {
    let code = extract_code(answer)?;

    if config.security.is_enabled() {
        check_security(&code, config)?;
    }

    if config.direct_sql && !code.contains("execute_sql_query") {
        return Err(ChatflowError::ExecuteSqlQueryNotUsed);
    }

    let cleaned = code
        .lines()
        .filter(|line| !is_stripped_line(line))
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.trim().is_empty() {
        return Err(ChatflowError::NoCodeFound(code));
    }
    Ok(cleaned)
}

/// Screens and sanitizes generated code. See [`clean_code`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeCleaning;

impl CodeCleaning {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Step for CodeCleaning {
    fn kind(&self) -> StepKind {
        StepKind::CodeCleaning
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        let answer = input.into_code()?;
        let code = clean_code(&answer, ctx.config())?;
        log_detail(ctx, self.kind(), "Code running", &code);
        ctx.add(LAST_CODE_CLEANED, json!(code));

        Ok(
            StepOutput::ok(StepValue::Code(code.clone()), "Code Cleaned Successfully")
                .with_metadata("code", json!(code)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityLevel;
    use crate::errors::ErrorKind;

    #[test]
    fn test_strips_show_and_dfs() {
        let answer = "```python\nimport pandas as pd\ndfs = []\ndf = dfs[0]\nplt.show()\nresult = {'type': 'number', 'value': 1}\n```";
        let code = clean_code(answer, &Config::default()).unwrap();
        assert_eq!(
            code,
            "import pandas as pd\ndf = dfs[0]\nresult = {'type': 'number', 'value': 1}"
        );
    }

    #[test]
    fn test_rejects_unlisted_import() {
        let err = clean_code("import requests\nresult = 1", &Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaliciousCode);
        assert!(err.to_string().contains("requests"));
    }

    #[test]
    fn test_custom_whitelist_allows_import() {
        let config = Config::default().with_whitelisted_dependencies(["polars"]);
        assert!(clean_code("import polars as pl\nresult = 1", &config).is_ok());
        assert!(clean_code("from numpy.linalg import norm\nresult = 1", &config).is_ok());
    }

    #[test]
    fn test_rejects_dangerous_builtins() {
        let err = clean_code("result = eval('1+1')", &Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaliciousCode);

        let ok = clean_code("result = df.eval('a + b')", &Config::default());
        assert!(ok.is_ok());
    }

    #[test]
    fn test_rejects_system_access() {
        let err = clean_code("os.system('ls')", &Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaliciousCode);
    }

    #[test]
    fn test_security_none_skips_screening() {
        let config = Config::default().with_security(SecurityLevel::None);
        assert!(clean_code("import requests\nresult = 1", &config).is_ok());
    }

    #[test]
    fn test_direct_sql_requires_helper() {
        let config = Config::default().with_direct_sql(true);
        let err = clean_code("result = 1", &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecuteSqlQueryNotUsed);
        assert!(clean_code("df = execute_sql_query('select 1')", &config).is_ok());
    }

    #[test]
    fn test_empty_answer_has_no_code() {
        let err = clean_code("   ", &Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCodeFound);
    }

    #[tokio::test]
    async fn test_only_accepted_code_is_recorded() {
        use crate::testing::{ScriptedExecutor, ScriptedLlm};
        use std::sync::Arc;

        let ctx =
            PipelineContext::builder(Arc::new(ScriptedLlm::new()), Arc::new(ScriptedExecutor::new()))
                .build();
        let step = CodeCleaning::new();

        let rejected = "import subprocess\nsubprocess.run('ls')";
        let err = step
            .execute(StepValue::Code(rejected.into()), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaliciousCode);
        assert_eq!(ctx.last_code_cleaned(), None);

        step.execute(StepValue::Code("result = 1\nplt.show()".into()), &ctx)
            .await
            .unwrap();
        assert_eq!(ctx.last_code_cleaned().as_deref(), Some("result = 1"));
    }
}
