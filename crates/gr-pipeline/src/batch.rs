//! Batch runs
//!
//! Many entities, bounded concurrency. Runs share only the read-only
//! record source and the output registry; each owns everything else.

use crate::error::PipelineError;
use crate::orchestrator::{ReportPipeline, RunOutcome};
use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use indexmap::IndexSet;

/// Outcomes of a batch, in request order
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// One outcome per distinct entity
    pub outcomes: Vec<RunOutcome>,
}

impl BatchSummary {
    /// Successful runs
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Failed runs
    pub fn failures(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// True when every run succeeded
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(RunOutcome::is_success)
    }
}

impl ReportPipeline {
    /// Run reports for `entities`, at most `concurrency` at a time
    pub async fn run_batch(&self, entities: &[String], concurrency: usize) -> BatchSummary {
        self.run_batch_on(entities, concurrency, Local::now().date_naive())
            .await
    }

    /// [`ReportPipeline::run_batch`] with an explicit report date
    pub async fn run_batch_on(
        &self,
        entities: &[String],
        concurrency: usize,
        date: NaiveDate,
    ) -> BatchSummary {
        let unique: IndexSet<&str> = entities.iter().map(|e| e.trim()).collect();
        tracing::info!(
            "Starting batch of {} entities (concurrency {})",
            unique.len(),
            concurrency.max(1)
        );

        let mut results: Vec<(usize, RunOutcome)> = stream::iter(unique.into_iter().enumerate())
            .map(|(i, entity)| async move { (i, self.run_on(entity, date).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);

        let summary = BatchSummary {
            outcomes: results.into_iter().map(|(_, outcome)| outcome).collect(),
        };
        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            summary.succeeded(),
            summary.outcomes.len() - summary.succeeded()
        );
        summary
    }

    /// Run reports for every entity in the record source
    ///
    /// # Errors
    /// Returns error if the entity list cannot be read
    pub async fn run_all(&self, concurrency: usize) -> Result<BatchSummary, PipelineError> {
        let entities = self.source().entities().await?;
        Ok(self.run_batch(&entities, concurrency).await)
    }
}
