//! `grounded-report` command line tool
//!
//! - `run`: one report for one entity
//! - `batch`: reports for several entities, or every entity in the records
//! - `validate`: re-check existing report text against the source records
//! - `check`: load and check a configuration without running
//! - `list`: entities present in a records file

use anyhow::Context;
use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use gr_core::ContentBlock;
use gr_facts::FactIndex;
use gr_generation::ScriptedGenerator;
use gr_pipeline::{
    JsonRecordSource, PipelineConfig, RecordSource, ReportPipeline, RunOutcome, RunStatus,
};
use gr_validation::{OverallStatus, Validator, ValidatorConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

fn cli() -> Command {
    let config = Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Pipeline configuration (YAML)");
    let records = Arg::new("records")
        .long("records")
        .short('r')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Source records (JSON array)");
    let responses = Arg::new("responses")
        .long("responses")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Scripted generator responses (JSON object of key -> text)");
    let date = Arg::new("date")
        .long("date")
        .value_parser(value_parser!(NaiveDate))
        .help("Report date (YYYY-MM-DD), defaults to today");
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print run summaries as JSON");

    Command::new("grounded-report")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Source-grounded narrative reports with claim validation and traceability")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Generate the report for one entity")
                .arg(config.clone())
                .arg(records.clone())
                .arg(responses.clone())
                .arg(
                    Arg::new("entity")
                        .long("entity")
                        .short('e')
                        .required(true)
                        .help("Entity to report on"),
                )
                .arg(date.clone())
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("batch")
                .about("Generate reports for several entities")
                .arg(config.clone())
                .arg(records.clone())
                .arg(responses)
                .arg(
                    Arg::new("entity")
                        .long("entity")
                        .short('e')
                        .action(ArgAction::Append)
                        .help("Entity to report on; repeat for more, omit for all"),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Runs in flight at once"),
                )
                .arg(date)
                .arg(json),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate existing report text against the source records")
                .arg(records.clone())
                .arg(
                    Arg::new("entity")
                        .long("entity")
                        .short('e')
                        .required(true)
                        .help("Entity the text is about"),
                )
                .arg(
                    Arg::new("text")
                        .long("text")
                        .short('t')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Text to validate; each paragraph is one block"),
                )
                .arg(
                    config
                        .clone()
                        .required(false)
                        .help("Take validation settings from this configuration"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Check a configuration file")
                .arg(config),
        )
        .subcommand(
            Command::new("list")
                .about("List entities in a records file")
                .arg(records),
        )
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

fn path_arg(args: &ArgMatches, name: &str) -> anyhow::Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

fn build_pipeline(args: &ArgMatches) -> anyhow::Result<ReportPipeline> {
    let config_path = path_arg(args, "config")?;
    let config = PipelineConfig::from_yaml_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let source = Arc::new(JsonRecordSource::new(path_arg(args, "records")?));
    let responses = path_arg(args, "responses")?;
    let generator = ScriptedGenerator::from_json_file(&responses)
        .with_context(|| format!("loading {}", responses.display()))?;
    Ok(ReportPipeline::new(config, source, Arc::new(generator))?)
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        let summary = serde_json::json!({
            "run_id": outcome.run_id,
            "entity": outcome.entity,
            "status": outcome.status,
            "final_state": outcome.final_state,
            "overall_status": outcome.report.as_ref().map(|r| r.overall_status.to_string()),
            "traceability_rate": outcome.ledger.as_ref().map(|l| l.traceability_rate),
            "warnings": outcome.warnings,
            "artifacts": outcome.artifacts,
            "error": outcome.error.as_ref().map(ToString::to_string),
            "metrics": outcome.metrics,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Entity: {}", outcome.entity);
    println!("  Run: {}", outcome.run_id);
    println!("  State: {}", outcome.final_state);
    if let Some(report) = &outcome.report {
        println!("  Validation: {}", report.overall_status);
    }
    if let Some(ledger) = &outcome.ledger {
        println!(
            "  Traceability: {:.1}% ({}/{})",
            ledger.traceability_rate * 100.0,
            ledger.matched_claims,
            ledger.total_claims
        );
    }
    for warning in &outcome.warnings {
        println!("  Warning: {warning}");
    }
    if let Some(path) = &outcome.artifacts.document {
        println!("  Report: {}", path.display());
    }
    if let Some(error) = &outcome.error {
        println!("  Error: {error}");
    }
    println!(
        "  Cost: {} calls, {} retries, ${:.4}",
        outcome.metrics.generation_calls(),
        outcome.metrics.retries(),
        outcome.metrics.estimated_cost_usd()
    );
    Ok(())
}

async fn run(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let pipeline = build_pipeline(args)?;
    let entity = args
        .get_one::<String>("entity")
        .context("missing --entity")?;
    let outcome = match args.get_one::<NaiveDate>("date") {
        Some(date) => pipeline.run_on(entity, *date).await,
        None => pipeline.run(entity).await,
    };
    print_outcome(&outcome, args.get_flag("json"))?;
    Ok(exit_code(outcome.status == RunStatus::Success))
}

async fn batch(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let pipeline = build_pipeline(args)?;
    let concurrency = args.get_one::<usize>("concurrency").copied().unwrap_or(4);
    let entities: Vec<String> = args
        .get_many::<String>("entity")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let summary = match (entities.is_empty(), args.get_one::<NaiveDate>("date")) {
        (true, None) => pipeline.run_all(concurrency).await?,
        (true, Some(date)) => {
            let all = pipeline.source().entities().await?;
            pipeline.run_batch_on(&all, concurrency, *date).await
        }
        (false, None) => pipeline.run_batch(&entities, concurrency).await,
        (false, Some(date)) => pipeline.run_batch_on(&entities, concurrency, *date).await,
    };
    let json = args.get_flag("json");
    for outcome in &summary.outcomes {
        print_outcome(outcome, json)?;
    }
    if !json {
        println!(
            "{} of {} reports succeeded",
            summary.succeeded(),
            summary.outcomes.len()
        );
    }
    Ok(exit_code(summary.all_succeeded()))
}

/// Blank-line separated paragraphs, each a factual block about `entity`
fn text_blocks(text: &str, entity: &str) -> Vec<ContentBlock> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, p)| ContentBlock::generated(format!("paragraph-{}", i + 1), p).with_subject(entity))
        .collect()
}

async fn validate(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let entity = args
        .get_one::<String>("entity")
        .context("missing --entity")?;
    let settings = match args.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?
            .validator_config(),
        None => ValidatorConfig::default(),
    };
    let validator = Validator::new(&settings)?;

    let source = JsonRecordSource::new(path_arg(args, "records")?);
    let records = source.load(entity).await?;
    let index = FactIndex::build(&records);

    let text_path = path_arg(args, "text")?;
    let text = tokio::fs::read_to_string(&text_path)
        .await
        .with_context(|| format!("reading {}", text_path.display()))?;
    let blocks = text_blocks(&text, entity);

    let outcome = validator.validate(&blocks, &index, Vec::new());
    if args.get_flag("json") {
        println!("{}", outcome.report.to_json()?);
    } else {
        print!("{}", outcome.report.render_text());
        for item in &outcome.ledger.untraceable {
            println!("Untraceable in {}: {}", item.insertion_id, item.span);
        }
    }
    Ok(exit_code(outcome.report.overall_status != OverallStatus::Fail))
}

fn check(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let path = path_arg(args, "config")?;
    let config = PipelineConfig::from_yaml_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate()?;

    println!("Configuration OK: {}", path.display());
    println!("  Template: {}", config.template.display());
    println!("  Output: {}", config.output.directory.display());
    for rule in &config.rules {
        println!(
            "  Rule {} -> {} ({:?}{}{})",
            rule.id,
            rule.anchor,
            rule.content_type,
            if rule.mandatory { ", mandatory" } else { "" },
            if rule.grounding_required { ", grounded" } else { "" },
        );
    }
    let required_fields = config.required_fields();
    let required: Vec<&str> = required_fields.iter().map(String::as_str).collect();
    println!("  Required fields: {}", required.join(", "));
    Ok(ExitCode::SUCCESS)
}

async fn list(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let source = JsonRecordSource::new(path_arg(args, "records")?);
    for entity in source.entities().await? {
        println!("{entity}");
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"))?;

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("batch", args)) => batch(args).await,
        Some(("validate", args)) => validate(args).await,
        Some(("check", args)) => check(args),
        Some(("list", args)) => list(args).await,
        _ => Ok(ExitCode::FAILURE),
    }
}
