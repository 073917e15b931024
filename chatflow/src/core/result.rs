//! Execution results, output types and the reply envelope.

use crate::errors::ChatflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output type a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// A numeric scalar.
    Number,
    /// A text answer.
    String,
    /// A table.
    Dataframe,
    /// A chart, as a file path or data URI.
    Plot,
}

impl OutputType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Dataframe => "dataframe",
            Self::Plot => "plot",
        }
    }

    /// Whether `value` has the shape this type requires.
    #[must_use]
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Dataframe => value.is_object() || value.is_array(),
            Self::Plot => value.is_string() || value.is_object(),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputType {
    type Err = ChatflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" => Ok(Self::Number),
            "string" => Ok(Self::String),
            "dataframe" => Ok(Self::Dataframe),
            "plot" => Ok(Self::Plot),
            other => Err(ChatflowError::InvalidConfig(format!(
                "unknown output type `{other}`"
            ))),
        }
    }
}

/// What a code executor returns: a type tag and a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Declared type tag.
    #[serde(rename = "type")]
    pub result_type: String,
    /// The produced value.
    pub value: serde_json::Value,
}

impl ExecutionResult {
    /// Creates an execution result.
    #[must_use]
    pub fn new(result_type: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            result_type: result_type.into(),
            value,
        }
    }

    /// The parsed type tag, if it is a known output type.
    #[must_use]
    pub fn output_type(&self) -> Option<OutputType> {
        self.result_type.parse().ok()
    }
}

/// Checks a result against the requested output type.
///
/// Returns whether the result is acceptable and the reasons it is not.
/// Without an expectation only the value shape of the declared tag is checked.
#[must_use]
pub fn validate_output(
    expected: Option<OutputType>,
    result: &ExecutionResult,
) -> (bool, Vec<String>) {
    let mut logs = Vec::new();

    let shape_type = match expected {
        Some(expected) => {
            if result.result_type != expected.as_str() {
                logs.push(format!(
                    "Expected {expected} to be returned, but got {}.",
                    result.result_type
                ));
            }
            Some(expected)
        }
        None => {
            let declared = result.output_type();
            if declared.is_none() {
                logs.push(format!("Unknown result type: {}", result.result_type));
            }
            declared
        }
    };

    if let Some(output_type) = shape_type {
        if !output_type.accepts(&result.value) {
            logs.push(format!(
                "Result value does not have the shape of a {output_type}: {}",
                result.value
            ));
        }
    }

    (logs.is_empty(), logs)
}

/// The parsed answer returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    /// Declared type tag.
    #[serde(rename = "type")]
    pub result_type: String,
    /// The answer value.
    pub value: serde_json::Value,
    /// The code that produced it.
    pub code: String,
}

impl ChatResult {
    /// Builds a response from an execution result and its code.
    #[must_use]
    pub fn new(result: ExecutionResult, code: impl Into<String>) -> Self {
        Self {
            result_type: result.result_type,
            value: result.value,
            code: code.into(),
        }
    }

    /// Renders the value as text. Strings are unquoted.
    #[must_use]
    pub fn to_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// What a top-level run hands back to its caller. Errors are values here.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    /// A parsed answer.
    Answer(ChatResult),
    /// Generated code, for code-only runs.
    Code(String),
    /// A formatted, user-facing failure message.
    Error(String),
}

impl ChatReply {
    /// Whether this reply reports a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the answer, if any.
    #[must_use]
    pub const fn answer(&self) -> Option<&ChatResult> {
        match self {
            Self::Answer(result) => Some(result),
            _ => None,
        }
    }

    /// Renders the reply as text.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Answer(result) => result.to_text(),
            Self::Code(code) => code.clone(),
            Self::Error(message) => message.clone(),
        }
    }
}

impl fmt::Display for ChatReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
