//! Typed prompts.
//!
//! Every prompt the engine sends is a [`Prompt`]: a [`PromptKind`] plus the
//! rendered text. Correction prompts are chosen from the failing error's
//! [`ErrorKind`] through [`CORRECTION_PROMPTS`].

mod templates;

use crate::context::PipelineContext;
use crate::core::OutputType;
use crate::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which template a prompt was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Code generation over dataframes.
    GeneratePythonCode,
    /// Code generation through `execute_sql_query`.
    GeneratePythonCodeWithSql,
    /// Generic correction.
    CorrectError,
    /// Correction of a wrongly typed result.
    CorrectOutputTypeError,
    /// Correction of code that skipped `execute_sql_query`.
    CorrectExecuteSqlQueryUsageError,
    /// Plain-language explanation of the last code.
    Explain,
    /// Clarification questions about the last query.
    ClarificationQuestions,
    /// Rephrasing of a query.
    RephraseQuery,
}

impl PromptKind {
    const fn template(self) -> &'static str {
        match self {
            Self::GeneratePythonCode => templates::GENERATE_PYTHON_CODE,
            Self::GeneratePythonCodeWithSql => templates::GENERATE_PYTHON_CODE_WITH_SQL,
            Self::CorrectError => templates::CORRECT_ERROR,
            Self::CorrectOutputTypeError => templates::CORRECT_OUTPUT_TYPE_ERROR,
            Self::CorrectExecuteSqlQueryUsageError => {
                templates::CORRECT_EXECUTE_SQL_QUERY_USAGE_ERROR
            }
            Self::Explain => templates::EXPLAIN,
            Self::ClarificationQuestions => templates::CLARIFICATION_QUESTIONS,
            Self::RephraseQuery => templates::REPHRASE_QUERY,
        }
    }
}

/// Correction template per error kind. Kinds not listed use
/// [`PromptKind::CorrectError`].
pub const CORRECTION_PROMPTS: &[(ErrorKind, PromptKind)] = &[
    (ErrorKind::InvalidOutputType, PromptKind::CorrectOutputTypeError),
    (
        ErrorKind::ExecuteSqlQueryNotUsed,
        PromptKind::CorrectExecuteSqlQueryUsageError,
    ),
];

/// Looks up the correction template for an error kind.
#[must_use]
pub fn correction_prompt_kind(kind: ErrorKind) -> PromptKind {
    CORRECTION_PROMPTS
        .iter()
        .find(|(k, _)| *k == kind)
        .map_or(PromptKind::CorrectError, |(_, prompt)| *prompt)
}

/// Result-shape instructions for an output type.
#[must_use]
pub fn output_type_hint(output_type: Option<OutputType>) -> &'static str {
    match output_type {
        Some(OutputType::Number) => {
            r#"type (must be "number"), value must int. Example: { "type": "number", "value": 125 }"#
        }
        Some(OutputType::String) => {
            r#"type (must be "string"), value must be string. Example: { "type": "string", "value": f"The highest salary is {highest_salary}." }"#
        }
        Some(OutputType::Dataframe) => {
            r#"type (must be "dataframe"), value must be pd.DataFrame or pd.Series. Example: { "type": "dataframe", "value": pd.DataFrame({...}) }"#
        }
        Some(OutputType::Plot) => {
            r#"type (must be "plot"), value must be string. Example: { "type": "plot", "value": "temp_chart.png" }"#
        }
        None => {
            r#"type (possible values "string", "number", "dataframe", "plot"). Examples: { "type": "string", "value": f"The highest salary is {highest_salary}." } or { "type": "number", "value": 125 } or { "type": "dataframe", "value": pd.DataFrame({...}) } or { "type": "plot", "value": "temp_chart.png" }"#
        }
    }
}

/// Values a template may reference, captured from a pipeline context.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    vars: HashMap<&'static str, String>,
}

impl PromptContext {
    /// Captures data-source schemas, conversation, skills, last code and
    /// output-type hints from `ctx`.
    #[must_use]
    pub fn from_pipeline(ctx: &PipelineContext) -> Self {
        let dataframes = ctx
            .data_sources()
            .iter()
            .enumerate()
            .map(|(i, source)| source.schema().to_prompt(i))
            .collect::<Vec<_>>()
            .join("\n\n");

        let (conversation, last_code, agent_description) = {
            let memory = ctx.memory();
            (
                memory.get_conversation(None),
                memory.last_code().map(ToString::to_string),
                memory.agent_description().map(ToString::to_string),
            )
        };

        let viz_library_hint = format!(
            "If you are asked to plot a chart, use \"{}\" for charts, save as png.",
            ctx.config().viz_library()
        );

        let mut vars = HashMap::new();
        vars.insert("dataframes", dataframes);
        vars.insert("conversation", conversation);
        vars.insert(
            "last_code",
            last_code
                .map(|code| format!("Previously you generated this code:\n```python\n{code}\n```"))
                .unwrap_or_default(),
        );
        vars.insert(
            "agent_description",
            agent_description.unwrap_or_default(),
        );
        vars.insert("skills", ctx.skills().prompt_section());
        vars.insert("viz_library_hint", viz_library_hint);
        vars.insert(
            "output_type_hint",
            output_type_hint(ctx.output_type()).to_string(),
        );
        Self { vars }
    }

    /// Sets a template variable.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.vars.insert(key, value.into());
        self
    }

    /// Reads a template variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// A rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Template it was rendered from.
    pub kind: PromptKind,
    /// Final text.
    pub text: String,
}

impl Prompt {
    /// Renders `kind` with `vars`.
    #[must_use]
    pub fn render(kind: PromptKind, vars: &PromptContext) -> Self {
        Self {
            kind,
            text: templates::render(kind.template(), &vars.vars),
        }
    }

    /// Wraps text that was not rendered from a template, e.g. in tests.
    #[must_use]
    pub fn raw(kind: PromptKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// The code-generation prompt for the current run.
    #[must_use]
    pub fn generate_code(ctx: &PipelineContext) -> Self {
        let kind = if ctx.config().direct_sql {
            PromptKind::GeneratePythonCodeWithSql
        } else {
            PromptKind::GeneratePythonCode
        };
        Self::render(kind, &PromptContext::from_pipeline(ctx))
    }

    /// The correction prompt for `code` failing with an error of `kind`.
    #[must_use]
    pub fn correction(ctx: &PipelineContext, kind: ErrorKind, code: &str, report: &str) -> Self {
        let vars = PromptContext::from_pipeline(ctx)
            .with("code", code)
            .with("error", report);
        Self::render(correction_prompt_kind(kind), &vars)
    }

    /// Asks for a plain-language explanation of `code`.
    #[must_use]
    pub fn explain(ctx: &PipelineContext, code: &str) -> Self {
        let vars = PromptContext::from_pipeline(ctx).with("code", code);
        Self::render(PromptKind::Explain, &vars)
    }

    /// Asks for clarification questions about `query`, which is rendered as
    /// the last message of the conversation.
    #[must_use]
    pub fn clarification_questions(ctx: &PipelineContext, query: &str) -> Self {
        let vars = PromptContext::from_pipeline(ctx);
        let conversation = match vars.get("conversation") {
            Some(previous) if !previous.is_empty() => format!("{previous}\n### QUERY\n {query}"),
            _ => format!("### QUERY\n {query}"),
        };
        Self::render(
            PromptKind::ClarificationQuestions,
            &vars.with("conversation", conversation),
        )
    }

    /// Asks for a rephrasing of `query`.
    #[must_use]
    pub fn rephrase_query(ctx: &PipelineContext, query: &str) -> Self {
        let vars = PromptContext::from_pipeline(ctx).with("query", query);
        Self::render(PromptKind::RephraseQuery, &vars)
    }

    /// Whether `output` is an acceptable answer to this prompt.
    ///
    /// Clarification prompts expect a JSON list of strings, optionally fenced.
    #[must_use]
    pub fn validate(&self, output: &str) -> bool {
        match self.kind {
            PromptKind::ClarificationQuestions => parse_json_list(output).is_some(),
            _ => true,
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parses a JSON list of strings, tolerating ```json fences.
#[must_use]
pub fn parse_json_list(output: &str) -> Option<Vec<String>> {
    let cleaned = output.replace("```json", "").replace("```", "");
    serde_json::from_str::<Vec<String>>(cleaned.trim()).ok()
}
