use chrono::NaiveDate;
use gr_core::{ContentHash, GenerationError, SchemaError, SourceRecord};
use gr_generation::{GenerationOutput, ScriptedGenerator};
use gr_pipeline::{
    CancelFlag, ContentType, GroundingFailureMode, InMemoryRecordSource, InsertionRule,
    JsonRecordSource, OutputRegistry, OutputSettings, PipelineConfig, PipelineError, RecordSource,
    ReportPipeline, RetrySettings, RunState, RunStatus, SchemaValidator,
};
use gr_test_utils::{
    acme_records, grounded_generator, two_entity_records, ungrounded_generator, write_records,
    write_template, RecordBuilder, ENTITY,
};
use gr_validation::OverallStatus;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
}

fn config(dir: &Path) -> PipelineConfig {
    PipelineConfig::new()
        .with_template(write_template(dir))
        .with_rule(
            InsertionRule::static_template("overview", "## Overview", "{entity} works in {sector}.")
                .with_fields(["sector"]),
        )
        .with_rule(
            InsertionRule::generated(
                "summary",
                "## Impact Summary",
                "Summarise {entity}: {people_served} people served. {data_source_status}",
            )
            .with_fields(["company_name", "people_served"])
            .mandatory()
            .grounding_required(),
        )
        .with_rule(
            InsertionRule::new("mechanisms", "## Mechanisms", ContentType::StructuredTable)
                .with_columns(["mechanism"]),
        )
        .with_rule(InsertionRule::new("appendix", "## Sources", ContentType::TraceabilityAppendix))
        .with_output(OutputSettings::default().with_directory(dir.join("out")))
        .with_retry(RetrySettings {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        })
}

fn pipeline(
    config: PipelineConfig,
    records: Vec<SourceRecord>,
    generator: Arc<ScriptedGenerator>,
) -> ReportPipeline {
    ReportPipeline::new(config, Arc::new(InMemoryRecordSource::new(records)), generator).unwrap()
}

#[tokio::test]
async fn grounded_run_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), acme_records(), Arc::new(grounded_generator()));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert_eq!(outcome.status, RunStatus::Success, "{:?}", outcome.error);
    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(outcome.transitions.len(), 5);
    let report = outcome.report.as_ref().unwrap();
    assert_eq!(report.overall_status, OverallStatus::Pass);
    assert_eq!(outcome.ledger.as_ref().unwrap().traceability_rate, 1.0);

    let document_path = outcome.artifacts.document.clone().unwrap();
    assert_eq!(
        document_path.file_name().unwrap().to_str(),
        Some("Acme_report_20240309.md")
    );
    let document = std::fs::read_to_string(&document_path).unwrap();
    assert!(document.contains("## Impact Summary\n\nAcme Corp served 1000 people.\n"));
    assert!(document.contains("## Overview\n\nAcme works in Water.\n"));
    assert!(document.contains("| Clean water |\n| Hygiene training |"));
    assert!(document.contains("Traceability rate: 100.0% (2 of 2 claims cited)"));
    assert!(!document.contains("VALIDATION FAILED"));

    let ledger: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(outcome.artifacts.traceability.as_ref().unwrap()).unwrap(),
    )
    .unwrap();
    assert_eq!(ledger["company_name"], "Acme");
    assert_eq!(ledger["total_citations"], 2);
    assert_eq!(ledger["citations"][0]["source_file"], "impact.xlsx");
    assert_eq!(ledger["validation_summary"]["traceability_rate"], 1.0);

    let validation =
        std::fs::read_to_string(outcome.artifacts.validation_report.as_ref().unwrap()).unwrap();
    assert!(validation.ends_with("Overall: PASS\n"));
    assert_eq!(validation, report.render_text());
}

#[tokio::test]
async fn zero_grounded_claims_in_mandatory_rule_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new().with_response("summary", "Acme had a wonderful year.");
    let pipeline = pipeline(config(dir.path()), acme_records(), Arc::new(generator));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert_eq!(outcome.status, RunStatus::Failure);
    assert_eq!(outcome.final_state, RunState::Failed);
    assert_eq!(outcome.transitions.last().unwrap().from, RunState::Validating);
    assert!(matches!(
        outcome.error,
        Some(PipelineError::GroundingFailure { ref rule, .. }) if rule == "summary"
    ));
    assert_eq!(outcome.report.as_ref().unwrap().overall_status, OverallStatus::Fail);

    let document = std::fs::read_to_string(outcome.artifacts.document.unwrap()).unwrap();
    assert!(document.starts_with("> **VALIDATION FAILED: grounding failure in rule `summary`"));
    let validation = std::fs::read_to_string(outcome.artifacts.validation_report.unwrap()).unwrap();
    assert!(validation.contains("Blocking failures:"));
    assert!(validation.ends_with("Overall: FAIL\n"));
}

#[tokio::test]
async fn ungrounded_claim_in_mandatory_rule_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), acme_records(), Arc::new(ungrounded_generator()));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert_eq!(outcome.final_state, RunState::Failed);
    let ledger = outcome.ledger.unwrap();
    assert_eq!(ledger.total_claims, 2);
    assert_eq!(ledger.untraceable[0].span, "5000");
}

#[tokio::test]
async fn suppress_mode_writes_nothing_on_grounding_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.output = config
        .output
        .clone()
        .with_grounding_failure(GroundingFailureMode::Suppress);
    let pipeline = pipeline(config, acme_records(), Arc::new(ungrounded_generator()));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert_eq!(outcome.status, RunStatus::Failure);
    assert!(outcome.artifacts.is_empty());
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn missing_optional_field_degrades_to_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_rule(
        InsertionRule::generated("risks", "## Risks", "List risks for {entity}: {risk_notes}")
            .with_fields(["risk_notes"]),
    );
    let generator = Arc::new(grounded_generator());
    let pipeline = pipeline(config, acme_records(), generator.clone());

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert_eq!(outcome.status, RunStatus::Success, "{:?}", outcome.error);
    assert_eq!(
        outcome.report.as_ref().unwrap().overall_status,
        OverallStatus::PassWithWarnings
    );
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("risk_notes"));
    assert_eq!(generator.calls(), 1);

    let risks = outcome
        .blocks
        .iter()
        .find(|b| b.insertion_id.as_str() == "risks")
        .unwrap();
    assert_eq!(risks.raw_text, "[data unavailable]");
    assert!(!risks.is_factual);

    let document = std::fs::read_to_string(outcome.artifacts.document.unwrap()).unwrap();
    assert!(document.contains("## Risks\n\n[data unavailable]\n"));
}

#[tokio::test]
async fn missing_required_field_is_a_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let records = RecordBuilder::new(ENTITY)
        .text("company_name", "Acme Corp")
        .text("sector", "Water")
        .build();
    let generator = Arc::new(grounded_generator());
    let pipeline = pipeline(config(dir.path()), records, generator.clone());

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(matches!(outcome.error, Some(PipelineError::Schema(_))));
    assert_eq!(
        outcome.transitions.iter().map(|t| t.to).collect::<Vec<_>>(),
        vec![RunState::Extracting, RunState::Failed]
    );
    assert_eq!(generator.calls(), 0);
    assert!(outcome.artifacts.is_empty());
}

#[tokio::test]
async fn missing_template_fails_before_generation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_template(dir.path().join("nope.md"));
    let generator = Arc::new(grounded_generator());
    let pipeline = pipeline(config, acme_records(), generator.clone());

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(matches!(outcome.error, Some(PipelineError::SourceNotFound { .. })));
    assert_eq!(outcome.final_state, RunState::Failed);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn transient_generation_errors_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let generator = grounded_generator();
    generator.push("summary", Err(GenerationError::RateLimited("429".into())));
    let generator = Arc::new(generator);
    let pipeline = pipeline(config(dir.path()), acme_records(), generator.clone());

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(generator.calls(), 2);
    let generating = outcome.metrics.stage("generating").unwrap();
    assert_eq!(generating.retries, 1);
    assert!(generating.output_tokens > 0);
}

#[tokio::test]
async fn permanent_generation_error_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let generator = grounded_generator();
    generator.push("summary", Err(GenerationError::AuthError("bad key".into())));
    let generator = Arc::new(generator);
    let pipeline = pipeline(config(dir.path()), acme_records(), generator.clone());

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(matches!(
        outcome.error,
        Some(PipelineError::Generation {
            source: GenerationError::AuthError(_),
            ..
        })
    ));
    assert_eq!(outcome.transitions.last().unwrap().from, RunState::Generating);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn overlong_text_is_truncated_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.rules[1].max_length = Some(30);
    let generator = ScriptedGenerator::new();
    generator.push(
        "summary",
        Ok(GenerationOutput {
            text: "Acme Corp served 1000 people. Many more were reached later.".into(),
            input_tokens: 10,
            output_tokens: 12,
        }),
    );
    let pipeline = pipeline(config, acme_records(), Arc::new(generator));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.blocks[1].raw_text, "Acme Corp served 1000 people.");
    assert!(outcome.warnings[0].contains("truncated"));
    assert_eq!(outcome.metrics.input_tokens(), 10);
}

#[tokio::test]
async fn cancelled_run_stops_at_stage_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();
    let generator = Arc::new(grounded_generator());
    let pipeline = pipeline(config(dir.path()), acme_records(), generator.clone())
        .with_cancel_flag(cancel.clone());
    cancel.cancel();

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(matches!(outcome.error, Some(PipelineError::Cancelled)));
    assert_eq!(outcome.final_state, RunState::Failed);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn identical_inputs_give_identical_reports() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), acme_records(), Arc::new(grounded_generator()));

    let first = pipeline.run_on(ENTITY, report_date()).await;
    let second = pipeline.run_on(ENTITY, report_date()).await;

    let (a, b) = (first.report.unwrap(), second.report.unwrap());
    assert_eq!(a.render_text(), b.render_text());
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(
        first.ledger.unwrap().traceability_rate,
        second.ledger.unwrap().traceability_rate
    );
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn batch_runs_each_entity_once() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), two_entity_records(), Arc::new(grounded_generator()));
    let entities = vec!["Acme".to_string(), "Globex".to_string(), "Acme".to_string()];

    let summary = pipeline.run_batch_on(&entities, 2, report_date()).await;

    assert_eq!(summary.outcomes.len(), 2);
    assert!(summary.all_succeeded());
    assert_eq!(summary.outcomes[0].entity, "Acme");
    assert_eq!(summary.outcomes[1].entity, "Globex");
    assert_ne!(
        summary.outcomes[0].artifacts.document,
        summary.outcomes[1].artifacts.document
    );
    assert_eq!(summary.failures().count(), 0);
}

#[tokio::test]
async fn json_record_source_feeds_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let records_path = write_records(dir.path(), &two_entity_records());
    let source = Arc::new(JsonRecordSource::new(records_path));
    let pipeline =
        ReportPipeline::new(config(dir.path()), source, Arc::new(grounded_generator())).unwrap();

    let entities = pipeline.source().entities().await.unwrap();
    let outcome = pipeline.run_on("Globex", report_date()).await;

    assert_eq!(entities, vec!["Acme", "Globex"]);
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.blocks[1].raw_text, "Globex Ltd served 250 people.");
}

#[tokio::test]
async fn run_all_covers_every_entity_in_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), two_entity_records(), Arc::new(grounded_generator()));

    let summary = pipeline.run_all(2).await.unwrap();

    let entities: Vec<&str> = summary.outcomes.iter().map(|o| o.entity.as_str()).collect();
    assert_eq!(entities, vec!["Acme", "Globex"]);
    assert_eq!(summary.succeeded(), 2);
}

#[tokio::test]
async fn output_path_owned_by_another_run_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let registry = OutputRegistry::shared();
    let held = dir.path().join("out").join("Acme_report_20240309.md");
    let _claim = registry.claim(&held, uuid::Uuid::new_v4()).unwrap();
    let pipeline = pipeline(config(dir.path()), acme_records(), Arc::new(grounded_generator()))
        .with_output_registry(registry.clone());

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(matches!(outcome.error, Some(PipelineError::OutputClaimed(ref path)) if path == &held));
    assert_eq!(outcome.final_state, RunState::Failed);
    assert!(!held.exists());
    assert!(registry.is_claimed(&held));
}

#[tokio::test]
async fn entities_sharing_a_sanitized_name_keep_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new()
        .with_template(write_template(dir.path()))
        .with_rule(
            InsertionRule::static_template("overview", "## Overview", "{entity} works in {sector}.")
                .with_fields(["sector"]),
        )
        .with_output(OutputSettings::default().with_directory(dir.path().join("out")));
    let mut records = RecordBuilder::new("Acme Corp").text("sector", "Water").build();
    records.extend(RecordBuilder::new("Acme/Corp").text("sector", "Energy").build());
    let pipeline = pipeline(config, records, Arc::new(ScriptedGenerator::new()));

    let first = pipeline.run_on("Acme Corp", report_date()).await;
    let second = pipeline.run_on("Acme/Corp", report_date()).await;

    let first_path = first.artifacts.document.unwrap();
    let second_path = second.artifacts.document.unwrap();
    assert_eq!(first_path.file_name().unwrap().to_str(), Some("Acme_Corp_report_20240309.md"));
    let suffix = ContentHash::compute(b"Acme/Corp").short();
    assert_eq!(
        second_path.file_name().unwrap().to_str(),
        Some(format!("Acme_Corp-{suffix}_report_20240309.md").as_str())
    );
    assert!(std::fs::read_to_string(&first_path).unwrap().contains("Acme Corp works in Water."));
    assert!(std::fs::read_to_string(&second_path).unwrap().contains("Acme/Corp works in Energy."));
}

#[tokio::test]
async fn fail_report_without_blocking_rule_is_a_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new()
        .with_template(write_template(dir.path()))
        .with_rule(
            InsertionRule::generated("summary", "## Impact Summary", "Summarise {entity}.")
                .with_fields(["company_name"]),
        )
        .with_output(OutputSettings::default().with_directory(dir.path().join("out")));
    let generator = ScriptedGenerator::new().with_response("summary", "Acme Corp helped 5000 teachers.");
    let pipeline = pipeline(config, acme_records(), Arc::new(generator));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(outcome.report.as_ref().unwrap().overall_status, OverallStatus::Fail);
    assert_eq!(outcome.status, RunStatus::Failure);
    assert!(!outcome.is_success());

    let document = std::fs::read_to_string(outcome.artifacts.document.unwrap()).unwrap();
    assert!(document.contains("Acme Corp helped 5000 teachers."));
    let validation = std::fs::read_to_string(outcome.artifacts.validation_report.unwrap()).unwrap();
    assert!(validation.ends_with("Overall: FAIL\n"));
}

#[tokio::test]
async fn grounded_static_template_is_validated_and_cited() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).with_rule(
        InsertionRule::static_template("reach", "## Risks", "{entity} reached {people_served} people.")
            .with_fields(["people_served"])
            .grounding_required(),
    );
    let pipeline = pipeline(config, acme_records(), Arc::new(grounded_generator()));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert_eq!(outcome.status, RunStatus::Success, "{:?}", outcome.error);
    let reach = outcome
        .blocks
        .iter()
        .find(|b| b.insertion_id.as_str() == "reach")
        .unwrap();
    assert!(reach.is_factual);
    let overview = outcome
        .blocks
        .iter()
        .find(|b| b.insertion_id.as_str() == "overview")
        .unwrap();
    assert!(!overview.is_factual);

    let ledger = outcome.ledger.unwrap();
    assert!(ledger
        .citations
        .iter()
        .any(|c| c.insertion_id.as_str() == "reach" && c.extracted_value.contains("1000")));
    assert!(ledger.untraceable.is_empty());
}

struct RejectAll;

impl SchemaValidator for RejectAll {
    fn validate(&self, entity: &str, _records: &[SourceRecord]) -> Result<(), SchemaError> {
        Err(SchemaError::UnknownEntity(entity.to_string()))
    }
}

#[tokio::test]
async fn custom_schema_validator_replaces_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), acme_records(), Arc::new(grounded_generator()))
        .with_schema_validator(Arc::new(RejectAll));

    let outcome = pipeline.run_on(ENTITY, report_date()).await;

    assert!(matches!(
        outcome.error,
        Some(PipelineError::Schema(SchemaError::UnknownEntity(ref e))) if e == "Acme"
    ));
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let config = PipelineConfig::new().with_rule(InsertionRule::generated(
        "summary",
        "## Impact Summary",
        "About {unknown}",
    ));
    let result = ReportPipeline::new(
        config,
        Arc::new(InMemoryRecordSource::default()),
        Arc::new(ScriptedGenerator::new()),
    );
    assert!(matches!(result, Err(PipelineError::Config(_))));
}
