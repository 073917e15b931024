//! Prompt templates and the renderer.
//!
//! Placeholders are `{name}`. Substitution is a single pass, so substituted
//! text (code, errors) is never re-scanned for placeholders.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").ok());

static BLANK_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{3,}").ok());

pub(super) const GENERATE_PYTHON_CODE: &str = r#"{agent_description}

{dataframes}

{skills}

Update this initial code:
```python
# Import the required dependencies
import pandas as pd

# Write code here

# Declare result var:
{output_type_hint}
```

{last_code}

{viz_library_hint}
Variable `dfs: list[pd.DataFrame]` is already declared.

At the end, declare "result" variable as a dictionary of type and value.

{conversation}

Generate python code and return full updated code:"#;

pub(super) const GENERATE_PYTHON_CODE_WITH_SQL: &str = r#"{agent_description}

<tables>
{dataframes}
</tables>

You are already provided with the following functions that you can call:
<function>
def execute_sql_query(sql_query: str) -> pd.Dataframe
    """This method connects to the database, executes the sql query and returns the dataframe"""
</function>

{skills}

Update this initial code:
```python
# Import the required dependencies
import pandas as pd

# Write code here

# Declare result var:
{output_type_hint}
```

{last_code}

{viz_library_hint}
At the end, declare "result" variable as a dictionary of type and value.

{conversation}

Generate python code and return full updated code:"#;

pub(super) const CORRECT_ERROR: &str = r#"{dataframes}

The user asked the following question:
{conversation}

You generated this python code:
{code}

It fails with the following error:
{error}

Fix the python code above and return the new python code:"#;

pub(super) const CORRECT_OUTPUT_TYPE_ERROR: &str = r#"{dataframes}

The user asked the following question:
{conversation}

You generated this python code:
{code}

The code returned a result of the wrong type:
{error}

Fix the python code above so that "result" has the following shape:
{output_type_hint}

Return the new python code:"#;

pub(super) const CORRECT_EXECUTE_SQL_QUERY_USAGE_ERROR: &str = r#"{dataframes}

The user asked the following question:
{conversation}

You generated this python code:
{code}

It fails with the following error:
{error}

Correct the python code and return a new python code (do not import anything) that fixes the above mentioned error. Make sure to use the `execute_sql_query` function to query the data. Do not generate the same code again."#;

pub(super) const EXPLAIN: &str = r#"The previous conversation we had

<Conversation>
{conversation}
</Conversation>

Based on the last conversation you generated the following code:

<Code>
{code}
</Code>

Explain how you came up with code for non-technical people without mentioning technical details or mentioning the libraries used?"#;

pub(super) const CLARIFICATION_QUESTIONS: &str = r#"{dataframes}

Find the clarification questions that could be asked to a senior data scientist would ask about the query contained in the last message of the following conversation:

{conversation}

Return up to 3 clarification questions in a json list, e.g. ["What is the ...?"]. Return an empty list if the query needs no clarification."#;

pub(super) const REPHRASE_QUERY: &str = r#"You are provided with the following pandas DataFrames:

{dataframes}

{conversation}

Return the rephrased sentence of "{query}" in order to obtain more accurate and comprehensive responses without any explanations."#;

/// Renders `template`, then collapses runs of blank lines.
pub(super) fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let substituted = match PLACEHOLDER.as_ref() {
        Some(placeholder) => placeholder
            .replace_all(template, |caps: &Captures<'_>| {
                vars.get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned(),
        None => template.to_string(),
    };

    let collapsed = match BLANK_RUNS.as_ref() {
        Some(blank_runs) => blank_runs.replace_all(&substituted, "\n\n").into_owned(),
        None => substituted,
    };
    collapsed.trim().to_string()
}
