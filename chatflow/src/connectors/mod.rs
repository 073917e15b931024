//! Data connectors and code executors.
//!
//! Both are collaborators: the engine reads schemas for prompts and hands
//! cleaned code to an executor, but never touches data itself.

use crate::core::ExecutionResult;
use crate::errors::Result;
use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Credentials of a SQL backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlCredentials {
    /// SQL dialect, e.g. `postgresql`.
    pub dialect: String,
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for SqlCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlCredentials")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where a connector's data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// An in-process table.
    Dataframe {
        /// Whether the table can be queried through `execute_sql_query`.
        sql_enabled: bool,
    },
    /// A table in a SQL database.
    Sql(SqlCredentials),
}

/// Schema view of a data source used in prompts and traces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    /// Table name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Column names.
    pub columns: Vec<String>,
    /// A few sample rows.
    #[serde(default)]
    pub head: Vec<Vec<serde_json::Value>>,
    /// Total number of rows.
    pub row_count: usize,
}

impl DataSchema {
    /// Renders the schema block embedded in prompts.
    #[must_use]
    pub fn to_prompt(&self, index: usize) -> String {
        let mut out = format!(
            "<dataframe index=\"{index}\" name=\"{}\"",
            self.name
        );
        if let Some(ref description) = self.description {
            out.push_str(&format!(" description=\"{description}\""));
        }
        out.push_str(&format!(">\n{}x{}\n", self.row_count, self.columns.len()));
        out.push_str(&self.columns.join(","));
        for row in &self.head {
            out.push('\n');
            out.push_str(
                &row.iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        out.push_str("\n</dataframe>");
        out
    }
}

/// A handle to tabular data.
pub trait DataConnector: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Where the data lives.
    fn source(&self) -> DataSource;

    /// Schema and sample rows.
    fn schema(&self) -> DataSchema;

    /// MD5 hex digest of the column names.
    fn column_hash(&self) -> String {
        let columns = self.schema().columns.join("|");
        hex::encode(Md5::digest(columns.as_bytes()))
    }

    /// Whether `other` lives in the same SQL backend with identical credentials.
    fn equals(&self, other: &dyn DataConnector) -> bool {
        match (self.source(), other.source()) {
            (DataSource::Sql(a), DataSource::Sql(b)) => a == b,
            _ => false,
        }
    }
}

/// Runs generated code against bound data sources.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Executes `code` and returns its typed result.
    async fn execute(
        &self,
        code: &str,
        sources: &[Arc<dyn DataConnector>],
    ) -> Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticConnector;

    fn credentials(host: &str) -> SqlCredentials {
        SqlCredentials {
            dialect: "postgresql".into(),
            host: host.into(),
            port: 5432,
            database: "sales".into(),
            username: "reader".into(),
            password: "secret".into(),
        }
    }

    #[test]
    fn test_sql_connectors_with_same_credentials_are_equal() {
        let a = StaticConnector::sql("orders", &["id"], credentials("db1"));
        let b = StaticConnector::sql("customers", &["id"], credentials("db1"));
        let c = StaticConnector::sql("orders", &["id"], credentials("db2"));
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_dataframes_are_never_equal() {
        let a = StaticConnector::dataframe("a", &["x"]);
        let b = StaticConnector::dataframe("a", &["x"]);
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_column_hash_depends_on_columns() {
        let a = StaticConnector::dataframe("a", &["x", "y"]);
        let b = StaticConnector::dataframe("b", &["x", "y"]);
        let c = StaticConnector::dataframe("a", &["x", "z"]);
        assert_eq!(a.column_hash(), b.column_hash());
        assert_ne!(a.column_hash(), c.column_hash());
        assert_eq!(a.column_hash().len(), 32);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", credentials("db1"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_schema_prompt_block() {
        let schema = DataSchema {
            name: "sales".into(),
            description: None,
            columns: vec!["region".into(), "revenue".into()],
            head: vec![vec![serde_json::json!("north"), serde_json::json!(10)]],
            row_count: 3,
        };
        assert_eq!(
            schema.to_prompt(0),
            "<dataframe index=\"0\" name=\"sales\">\n3x2\nregion,revenue\nnorth,10\n</dataframe>"
        );
    }
}
