//! Input validation.

use super::Step;
use crate::connectors::{DataConnector, DataSource};
use crate::context::PipelineContext;
use crate::core::{StepKind, StepOutput, StepValue};
use crate::errors::{ChatflowError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Rejects data-source setups the configuration cannot serve.
///
/// In direct SQL mode every source must be either a SQL connector sharing
/// the first source's backend and credentials, or a SQL-enabled dataframe.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidatePipelineInput;

impl ValidatePipelineInput {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_direct_sql(sources: &[Arc<dyn DataConnector>]) -> Result<()> {
        let Some(first) = sources.first() else {
            return Ok(());
        };

        let same_backend = sources.iter().all(|source| {
            matches!(source.source(), DataSource::Sql(_)) && source.equals(first.as_ref())
        });
        let sql_enabled_frames = sources.iter().all(|source| {
            matches!(source.source(), DataSource::Dataframe { sql_enabled: true })
        });

        if same_backend || sql_enabled_frames {
            Ok(())
        } else {
            Err(ChatflowError::InvalidConfig(
                "Direct requires all Connector and they belong to same datasource and have same credentials"
                    .to_string(),
            ))
        }
    }
}

#[async_trait]
impl Step for ValidatePipelineInput {
    fn kind(&self) -> StepKind {
        StepKind::ValidatePipelineInput
    }

    async fn execute(&self, input: StepValue, ctx: &PipelineContext) -> Result<StepOutput> {
        if ctx.config().direct_sql {
            Self::validate_direct_sql(ctx.data_sources())?;
        }
        Ok(StepOutput::ok(input, "Input Validation Successful"))
    }
}
