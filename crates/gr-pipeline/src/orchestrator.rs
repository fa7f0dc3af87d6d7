//! Report pipeline
//!
//! Drives one report run through the state machine:
//! - Extracting: records, schema check, template, fact index
//! - Generating: one content block per rule, in configuration order
//! - Validating: the full validation pass, then the per-rule blocking check
//! - Assembling: blocks into the document, artifacts to disk
//!
//! Stages are strictly sequential. Cancellation is honoured only between
//! stages, never during a generation call.

use crate::config::{ContentType, GroundingFailureMode, InsertionRule, PipelineConfig};
use crate::document::{render_table, DocumentSink, MarkdownDocument};
use crate::error::{ConfigError, PipelineError};
use crate::ledger::TraceabilityFile;
use crate::output::{output_filename, sibling_path, OutputRegistry};
use crate::source::{RecordSource, RequiredFieldsValidator, SchemaValidator};
use crate::state_machine::{RunState, RunStateMachine, Transition};
use chrono::{Local, NaiveDate, Utc};
use gr_core::{BlockOrigin, ContentBlock, SourceRecord};
use gr_facts::FactIndex;
use gr_generation::{
    render, PromptContext, RetryingGenerator, RunMetrics, StageMetrics, StageTimer, TextGenerator,
};
use gr_validation::{
    OverallStatus, TraceabilityLedger, ValidationOutcome, ValidationReport, Validator,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Cooperative cancellation checked at stage boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Report PASS or PASS_WITH_WARNINGS, artifacts written
    Success,
    /// Schema error, missing input, generation or blocking failure, or
    /// a completed run whose report is FAIL
    Failure,
}

/// Files written by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifacts {
    /// Report document
    pub document: Option<PathBuf>,
    /// Traceability ledger JSON
    pub traceability: Option<PathBuf>,
    /// Human-readable validation report
    pub validation_report: Option<PathBuf>,
}

impl RunArtifacts {
    /// True when nothing was written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document.is_none() && self.traceability.is_none() && self.validation_report.is_none()
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique run id
    pub run_id: Uuid,
    /// Report subject
    pub entity: String,
    /// Success or failure
    pub status: RunStatus,
    /// Last state reached
    pub final_state: RunState,
    /// State transitions in order
    pub transitions: Vec<Transition>,
    /// Content blocks, once generation completed
    pub blocks: Vec<ContentBlock>,
    /// Degradation warnings
    pub warnings: Vec<String>,
    /// Validation report, once validation ran
    pub report: Option<ValidationReport>,
    /// Citation ledger, once validation ran
    pub ledger: Option<TraceabilityLedger>,
    /// Written files
    pub artifacts: RunArtifacts,
    /// Error that ended the run
    pub error: Option<PipelineError>,
    /// Per-stage metrics
    pub metrics: RunMetrics,
}

impl RunOutcome {
    /// True for [`RunStatus::Success`]
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Mutable state of one run
struct RunContext {
    run_id: Uuid,
    entity: String,
    date: NaiveDate,
    machine: RunStateMachine,
    metrics: RunMetrics,
    warnings: Vec<String>,
    blocks: Vec<ContentBlock>,
    report: Option<ValidationReport>,
    ledger: Option<TraceabilityLedger>,
    artifacts: RunArtifacts,
}

impl RunContext {
    fn new(entity: &str, date: NaiveDate, metrics: RunMetrics) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entity: entity.trim().to_string(),
            date,
            machine: RunStateMachine::new(),
            metrics,
            warnings: Vec::new(),
            blocks: Vec::new(),
            report: None,
            ledger: None,
            artifacts: RunArtifacts::default(),
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("[{}] {}", self.entity, message);
        self.warnings.push(message);
    }
}

/// A generated block and where it goes
struct PlannedBlock<'a> {
    rule: &'a InsertionRule,
    block: ContentBlock,
    table: Option<Vec<Vec<String>>>,
}

/// Orchestrates report runs
///
/// One pipeline can serve many runs, sequentially or concurrently; each
/// run owns its own fact index, blocks and document.
pub struct ReportPipeline {
    config: Arc<PipelineConfig>,
    source: Arc<dyn RecordSource>,
    schema: Arc<dyn SchemaValidator>,
    generator: RetryingGenerator,
    validator: Validator,
    outputs: Arc<OutputRegistry>,
    cancel: CancelFlag,
}

impl ReportPipeline {
    /// Build a pipeline over a validated configuration
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn RecordSource>,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let validator = Validator::new(&config.validator_config()).map_err(ConfigError::from)?;
        let schema = Arc::new(RequiredFieldsValidator::new(config.required_fields()));
        let generator = RetryingGenerator::new(generator, config.retry.to_policy());
        Ok(Self {
            config: Arc::new(config),
            source,
            schema,
            generator,
            validator,
            outputs: OutputRegistry::shared(),
            cancel: CancelFlag::new(),
        })
    }

    /// Replace the schema validator
    #[must_use]
    pub fn with_schema_validator(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = schema;
        self
    }

    /// Share an output registry with other pipelines
    #[must_use]
    pub fn with_output_registry(mut self, outputs: Arc<OutputRegistry>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Use an externally owned cancel flag
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Record source
    #[must_use]
    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    /// Flag that cancels runs at the next stage boundary
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run a report for `entity` dated today
    pub async fn run(&self, entity: &str) -> RunOutcome {
        self.run_on(entity, Local::now().date_naive()).await
    }

    /// Run a report for `entity` with an explicit report date
    pub async fn run_on(&self, entity: &str, date: NaiveDate) -> RunOutcome {
        let mut ctx = RunContext::new(entity, date, RunMetrics::new(self.config.pricing));
        tracing::info!("Starting report run {} for {}", ctx.run_id, ctx.entity);

        let error = match self.drive(&mut ctx).await {
            Ok(()) => None,
            Err(err) => {
                if !ctx.machine.state().is_terminal() {
                    if let Err(sm) = ctx.machine.fail(err.to_string()) {
                        tracing::error!("Cannot record failure: {}", sm);
                    }
                }
                tracing::error!("Report run for {} failed: {}", ctx.entity, err);
                Some(err)
            }
        };

        let final_state = ctx.machine.state();
        let status = run_status(error.as_ref(), final_state, ctx.report.as_ref());
        tracing::info!(
            "Run {} finished in {} ({} ms, {} generation calls, ${:.4})",
            ctx.run_id,
            final_state,
            ctx.metrics.total_elapsed_ms(),
            ctx.metrics.generation_calls(),
            ctx.metrics.estimated_cost_usd()
        );

        RunOutcome {
            run_id: ctx.run_id,
            entity: ctx.entity,
            status,
            final_state,
            transitions: ctx.machine.history().to_vec(),
            blocks: ctx.blocks,
            warnings: ctx.warnings,
            report: ctx.report,
            ledger: ctx.ledger,
            artifacts: ctx.artifacts,
            error,
            metrics: ctx.metrics,
        }
    }

    fn enter(&self, ctx: &mut RunContext, state: RunState) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            tracing::warn!("Run {} cancelled before {}", ctx.run_id, state);
            return Err(PipelineError::Cancelled);
        }
        ctx.machine.advance(state)?;
        tracing::info!("[{}] Stage: {}", ctx.entity, state);
        Ok(())
    }

    async fn drive(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        self.enter(ctx, RunState::Extracting)?;
        let timer = StageTimer::start(RunState::Extracting.as_str());
        let extracted = self.extract(ctx).await;
        ctx.metrics.push(timer.finish());
        let (records, mut document, index) = extracted?;

        self.enter(ctx, RunState::Generating)?;
        let mut timer = StageTimer::start(RunState::Generating.as_str());
        let generated = self
            .generate_blocks(ctx, &records, &document, timer.metrics_mut())
            .await;
        ctx.metrics.push(timer.finish());
        let planned = generated?;

        self.enter(ctx, RunState::Validating)?;
        let timer = StageTimer::start(RunState::Validating.as_str());
        let blocks: Vec<ContentBlock> = planned.iter().map(|p| p.block.clone()).collect();
        let mut outcome = self.validator.validate(&blocks, &index, ctx.warnings.clone());
        if !outcome.ledger.verify_against(&index) {
            for address in outcome.ledger.unresolved_addresses(&index) {
                tracing::warn!("[{}] Citation does not resolve: {}", ctx.entity, address);
            }
        }
        let blocking = self.blocking_failure(&outcome);
        if let Some(err) = &blocking {
            tracing::error!("[{}] {}", ctx.entity, err);
            outcome.report.record_blocking_failure(err.to_string());
        }
        tracing::info!(
            "[{}] Validation: {} (traceability {:.1}%, {} hallucinated statements)",
            ctx.entity,
            outcome.report.overall_status,
            outcome.ledger.traceability_rate * 100.0,
            outcome.hallucination.hallucination_count()
        );
        ctx.blocks = blocks;
        ctx.report = Some(outcome.report.clone());
        ctx.ledger = Some(outcome.ledger.clone());
        ctx.metrics.push(timer.finish());

        if let Some(err) = blocking {
            ctx.machine.fail(err.to_string())?;
            if self.config.output.on_grounding_failure == GroundingFailureMode::EmitFlagged {
                let banner = format!("VALIDATION FAILED: {err}");
                self.assemble(&mut document, &planned, &outcome.ledger, Some(&banner));
                match self.write_artifacts(ctx, &document, &outcome).await {
                    Ok(artifacts) => ctx.artifacts = artifacts,
                    Err(write_err) => {
                        tracing::error!("Failed to write flagged artifacts: {}", write_err);
                    }
                }
            }
            return Err(err);
        }

        self.enter(ctx, RunState::Assembling)?;
        let timer = StageTimer::start(RunState::Assembling.as_str());
        self.assemble(&mut document, &planned, &outcome.ledger, None);
        let written = self.write_artifacts(ctx, &document, &outcome).await;
        ctx.metrics.push(timer.finish());
        ctx.artifacts = written?;

        ctx.machine.advance(RunState::Done)?;
        Ok(())
    }

    async fn extract(
        &self,
        ctx: &RunContext,
    ) -> Result<(Vec<SourceRecord>, MarkdownDocument, FactIndex), PipelineError> {
        let records = self.source.load(&ctx.entity).await?;
        self.schema.validate(&ctx.entity, &records)?;

        let template = tokio::fs::read_to_string(&self.config.template)
            .await
            .map_err(|e| PipelineError::io(&self.config.template, e))?;
        let document = MarkdownDocument::from_template(&template);

        let index = FactIndex::build(&records);
        tracing::info!(
            "[{}] Extracted {} records from {} into {} facts",
            ctx.entity,
            records.len(),
            self.source.name(),
            index.len()
        );
        Ok((records, document, index))
    }

    async fn generate_blocks<'a>(
        &'a self,
        ctx: &mut RunContext,
        records: &[SourceRecord],
        document: &MarkdownDocument,
        metrics: &mut StageMetrics,
    ) -> Result<Vec<PlannedBlock<'a>>, PipelineError> {
        let mut planned = Vec::with_capacity(self.config.rules.len());

        for rule in &self.config.rules {
            if !document.has_anchor(&rule.anchor) {
                ctx.warn(format!(
                    "anchor `{}` for rule `{}` not found in template",
                    rule.anchor, rule.id
                ));
            }

            let mut table = None;
            let block = match rule.content_type {
                ContentType::TraceabilityAppendix => continue,
                ContentType::StaticTemplate => {
                    let context = prompt_context(&ctx.entity, rule, records);
                    note_fallbacks(ctx, rule, &context);
                    let template = rule.template.as_deref().unwrap_or_default();
                    ContentBlock::template(rule.id.as_str(), render_rule(rule, template, &context)?)
                }
                ContentType::GeneratedText => {
                    let context = prompt_context(&ctx.entity, rule, records);
                    if !rule.fields.is_empty() && context.data_status.from_source.is_empty() {
                        ctx.warn(format!(
                            "rule `{}` used fallback text: no source data for {}",
                            rule.id,
                            rule.fields.join(", ")
                        ));
                        ContentBlock::fallback(rule.id.as_str(), rule.fallback())
                    } else {
                        note_fallbacks(ctx, rule, &context);
                        let prompt_template = rule.prompt_template.as_deref().unwrap_or_default();
                        let prompt = render_rule(rule, prompt_template, &context)?;
                        let output = self
                            .generator
                            .generate(&prompt, &context, metrics)
                            .await
                            .map_err(|source| PipelineError::Generation {
                                rule: rule.id.clone(),
                                source,
                            })?;
                        let text = match rule.max_length.and_then(|max| truncate_text(&output.text, max)) {
                            Some(truncated) => {
                                ctx.warn(format!(
                                    "rule `{}` text truncated to {} characters",
                                    rule.id,
                                    truncated.chars().count()
                                ));
                                truncated
                            }
                            None => output.text,
                        };
                        ContentBlock::generated(rule.id.as_str(), text)
                    }
                }
                ContentType::StructuredTable => {
                    let rows = table_rows(rule, records);
                    if rows.is_empty() {
                        ctx.warn(format!(
                            "rule `{}` used fallback text: no rows for table",
                            rule.id
                        ));
                        ContentBlock::fallback(rule.id.as_str(), rule.fallback())
                    } else {
                        let text = render_table(&rule.columns, &rows);
                        table = Some(rows);
                        ContentBlock::table(rule.id.as_str(), text)
                    }
                }
            };

            let mut block = block.with_subject(ctx.entity.as_str());
            if rule.is_factual() && block.origin != BlockOrigin::Fallback {
                block = block.factual();
            }
            tracing::debug!("[{}] Rule `{}` produced {} chars", ctx.entity, rule.id, block.raw_text.len());
            planned.push(PlannedBlock { rule, block, table });
        }
        Ok(planned)
    }

    fn blocking_failure(&self, outcome: &ValidationOutcome) -> Option<PipelineError> {
        for rule in &self.config.rules {
            if rule.content_type == ContentType::TraceabilityAppendix {
                continue;
            }
            let tally = outcome.rule_grounding(&rule.id);
            if rule.requires_grounding() && (tally.matched == 0 || tally.unmatched() > 0) {
                return Some(PipelineError::GroundingFailure {
                    rule: rule.id.clone(),
                    detail: format!("{} of {} claims grounded", tally.matched, tally.claims),
                });
            }
            if rule.hallucination_blocking && tally.hallucinations > 0 {
                return Some(PipelineError::HallucinationDetected {
                    rule: rule.id.clone(),
                    count: tally.hallucinations,
                });
            }
        }
        None
    }

    fn assemble(
        &self,
        document: &mut MarkdownDocument,
        planned: &[PlannedBlock<'_>],
        ledger: &TraceabilityLedger,
        banner: Option<&str>,
    ) {
        for item in planned {
            match &item.table {
                Some(rows) => document.insert_table(&item.rule.anchor, &item.rule.columns, rows),
                None => document.insert_paragraph(&item.rule.anchor, &item.block.raw_text),
            };
        }

        let appendix = render_appendix(ledger);
        match self
            .config
            .rules
            .iter()
            .find(|r| r.content_type == ContentType::TraceabilityAppendix)
        {
            Some(rule) => {
                document.insert_paragraph(&rule.anchor, &appendix);
            }
            None => document.append_section("Traceability", &appendix),
        }

        if let Some(banner) = banner {
            document.prepend_banner(banner);
        }
    }

    async fn write_artifacts(
        &self,
        ctx: &RunContext,
        document: &MarkdownDocument,
        outcome: &ValidationOutcome,
    ) -> Result<RunArtifacts, PipelineError> {
        let output = &self.config.output;
        tokio::fs::create_dir_all(&output.directory)
            .await
            .map_err(|source| PipelineError::Io {
                path: output.directory.clone(),
                source,
            })?;

        let stem = self.outputs.entity_stem(&ctx.entity);
        let document_path = output
            .directory
            .join(output_filename(&output.filename_pattern, &stem, ctx.date));
        let _claim = self.outputs.claim(&document_path, ctx.run_id)?;

        let mut artifacts = RunArtifacts::default();
        write_file(&document_path, document.render()).await?;
        tracing::info!("Report saved to: {}", document_path.display());
        artifacts.document = Some(document_path.clone());

        if output.write_traceability {
            let path = sibling_path(&document_path, "traceability.json");
            let file = TraceabilityFile::from_ledger(&ctx.entity, &outcome.ledger, Utc::now());
            write_file(&path, file.to_json()?).await?;
            tracing::info!("Traceability saved to: {}", path.display());
            artifacts.traceability = Some(path);
        }

        if output.write_validation_report {
            let path = sibling_path(&document_path, "validation.txt");
            write_file(&path, outcome.report.render_text()).await?;
            artifacts.validation_report = Some(path);
        }

        Ok(artifacts)
    }
}

/// Success needs a completed run whose report is not FAIL
fn run_status(
    error: Option<&PipelineError>,
    final_state: RunState,
    report: Option<&ValidationReport>,
) -> RunStatus {
    let report_passed = report.is_some_and(|r| r.overall_status != OverallStatus::Fail);
    if error.is_none() && final_state == RunState::Done && report_passed {
        RunStatus::Success
    } else {
        RunStatus::Failure
    }
}

async fn write_file(path: &Path, contents: String) -> Result<(), PipelineError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn render_rule(rule: &InsertionRule, template: &str, context: &PromptContext) -> Result<String, PipelineError> {
    render(template, context).map_err(|source| PipelineError::Render {
        rule: rule.id.clone(),
        source,
    })
}

/// Prompt context of one rule: each declared field from the records,
/// list-valued when the field repeats, fallback text when absent
fn prompt_context(entity: &str, rule: &InsertionRule, records: &[SourceRecord]) -> PromptContext {
    let mut context = PromptContext::new(entity, rule.id.as_str());
    for field in &rule.fields {
        let values: Vec<String> = records
            .iter()
            .filter(|r| &r.field_name == field && !r.value.is_blank())
            .map(|r| r.value.to_string())
            .collect();
        context = match values.as_slice() {
            [] => context.with_fallback(field.as_str(), rule.fallback()),
            [single] => context.with_field(field.as_str(), single.as_str()),
            _ => context.with_list(field.as_str(), &values),
        };
    }
    context
}

fn note_fallbacks(ctx: &mut RunContext, rule: &InsertionRule, context: &PromptContext) {
    if context.data_status.is_degraded() {
        ctx.warn(format!(
            "rule `{}` used fallback text for missing fields: {}",
            rule.id,
            context.data_status.fallback.join(", ")
        ));
    }
}

/// Column-aligned rows: row `i` holds the `i`-th value of each column
fn table_rows(rule: &InsertionRule, records: &[SourceRecord]) -> Vec<Vec<String>> {
    let columns: Vec<Vec<String>> = rule
        .columns
        .iter()
        .map(|column| {
            records
                .iter()
                .filter(|r| &r.field_name == column && !r.value.is_blank())
                .map(|r| r.value.to_string())
                .collect()
        })
        .collect();
    let height = columns.iter().map(Vec::len).max().unwrap_or(0);
    (0..height)
        .map(|i| {
            columns
                .iter()
                .map(|values| values.get(i).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Cut `text` to at most `max_chars`, preferring a sentence boundary
fn truncate_text(text: &str, max_chars: usize) -> Option<String> {
    if text.chars().count() <= max_chars {
        return None;
    }
    let cut: String = text.chars().take(max_chars).collect();
    let sentence_end = cut
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'))
        .map(|(i, c)| i + c.len_utf8())
        .last();
    Some(match sentence_end {
        Some(end) => cut[..end].to_string(),
        None => cut.trim_end().to_string(),
    })
}

fn render_appendix(ledger: &TraceabilityLedger) -> String {
    let mut lines = vec![format!(
        "Traceability rate: {:.1}% ({} of {} claims cited)",
        ledger.traceability_rate * 100.0,
        ledger.matched_claims,
        ledger.total_claims
    )];
    for (i, citation) in ledger.citations.iter().enumerate() {
        lines.push(format!(
            "{}. \"{}\" [source: {}, value: {}, confidence: {:.2}]",
            i + 1,
            citation.statement,
            citation.source_address,
            citation.extracted_value,
            citation.confidence
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gr_core::SourceAddress;
    use pretty_assertions::assert_eq;

    fn record(field: &str, value: &str) -> SourceRecord {
        SourceRecord::new(SourceAddress::new("impact.xlsx"), "Acme", field, value)
    }

    #[test]
    fn repeated_fields_become_lists() {
        let rule = InsertionRule::generated("s", "## S", "{regions} {risks}").with_fields(["regions", "risks"]);
        let records = vec![record("regions", "Nairobi"), record("regions", "Kampala")];

        let context = prompt_context("Acme", &rule, &records);

        assert_eq!(context.get("regions").as_deref(), Some("Nairobi, Kampala"));
        assert_eq!(context.get("risks").as_deref(), Some("[data unavailable]"));
        assert_eq!(context.data_status.fallback, vec!["risks"]);
    }

    #[test]
    fn table_rows_align_columns() {
        let rule = InsertionRule::new("t", "## T", ContentType::StructuredTable)
            .with_columns(["mechanism", "beneficiaries"]);
        let records = vec![
            record("mechanism", "Clean water"),
            record("beneficiaries", "1000"),
            record("mechanism", "Training"),
        ];
        assert_eq!(
            table_rows(&rule, &records),
            vec![
                vec!["Clean water".to_string(), "1000".to_string()],
                vec!["Training".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn truncation_prefers_sentence_boundaries() {
        assert_eq!(truncate_text("short", 10), None);
        assert_eq!(
            truncate_text("First sentence. Second one runs long", 20).as_deref(),
            Some("First sentence.")
        );
        assert_eq!(truncate_text("no boundary here at all", 10).as_deref(), Some("no boundar"));
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
