//! Pipeline configuration
//!
//! Loaded from YAML and validated once, before any run starts. Every rule
//! is closed: prompts and templates may only reference the rule's declared
//! fields and the built-in placeholders.

use crate::error::{ConfigError, PipelineError};
use gr_generation::{is_builtin, placeholders, RetryPolicy, TokenPricing};
use gr_validation::{ExtractorConfig, HallucinationConfig, ValidationPolicy, ValidatorConfig};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Text used when a rule's source data is missing
pub const DEFAULT_FALLBACK_TEXT: &str = "[data unavailable]";

/// How a rule produces its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Template filled with field values
    StaticTemplate,
    /// Prompt sent to the text generator
    GeneratedText,
    /// Table of field values
    StructuredTable,
    /// Citation appendix built from the traceability ledger
    TraceabilityAppendix,
}

/// Where and how one block of content is inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionRule {
    /// Unique rule id, also the block's insertion id
    pub id: String,
    /// Exact paragraph text the content is inserted after
    pub anchor: String,
    /// Content producer
    pub content_type: ContentType,
    /// Prompt for `generated_text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    /// Text for `static_template`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Source fields available to the prompt or template
    #[serde(default)]
    pub fields: Vec<String>,
    /// Table columns for `structured_table`
    #[serde(default)]
    pub columns: Vec<String>,
    /// Rule failures can fail the run
    #[serde(default)]
    pub mandatory: bool,
    /// Claims in this rule must be grounded
    #[serde(default)]
    pub grounding_required: bool,
    /// Hallucinations in this rule fail the run
    #[serde(default)]
    pub hallucination_blocking: bool,
    /// Character cap on generated text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Text used when source data is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_text: Option<String>,
}

impl InsertionRule {
    /// Create a rule with no fields
    #[must_use]
    pub fn new(id: impl Into<String>, anchor: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            id: id.into(),
            anchor: anchor.into(),
            content_type,
            prompt_template: None,
            template: None,
            fields: Vec::new(),
            columns: Vec::new(),
            mandatory: false,
            grounding_required: false,
            hallucination_blocking: false,
            max_length: None,
            fallback_text: None,
        }
    }

    /// Generated-text rule
    #[must_use]
    pub fn generated(id: impl Into<String>, anchor: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(id, anchor, ContentType::GeneratedText).with_prompt(prompt)
    }

    /// Static-template rule
    #[must_use]
    pub fn static_template(
        id: impl Into<String>,
        anchor: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let mut rule = Self::new(id, anchor, ContentType::StaticTemplate);
        rule.template = Some(template.into());
        rule
    }

    /// Set the prompt
    #[inline]
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_template = Some(prompt.into());
        self
    }

    /// Declare source fields
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declare table columns
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Mark mandatory
    #[inline]
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Require grounding
    #[inline]
    #[must_use]
    pub fn grounding_required(mut self) -> Self {
        self.grounding_required = true;
        self
    }

    /// Block the run on hallucinations
    #[inline]
    #[must_use]
    pub fn hallucination_blocking(mut self) -> Self {
        self.hallucination_blocking = true;
        self
    }

    /// Cap generated text length
    #[inline]
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Set the fallback text
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = Some(text.into());
        self
    }

    /// Fallback text in effect
    #[must_use]
    pub fn fallback(&self) -> &str {
        self.fallback_text.as_deref().unwrap_or(DEFAULT_FALLBACK_TEXT)
    }

    /// Whether grounding applies to this rule's block
    #[must_use]
    pub fn is_factual(&self) -> bool {
        self.content_type == ContentType::GeneratedText || self.grounding_required
    }

    /// Mandatory and grounding-required
    #[must_use]
    pub fn requires_grounding(&self) -> bool {
        self.mandatory && self.grounding_required
    }

    /// Source fields this rule reads
    #[must_use]
    pub fn source_fields(&self) -> Vec<&str> {
        let declared = match self.content_type {
            ContentType::StructuredTable => &self.columns,
            _ => &self.fields,
        };
        declared.iter().map(String::as_str).collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let text = match self.content_type {
            ContentType::GeneratedText => Some(self.prompt_template.as_deref().ok_or_else(|| {
                ConfigError::MissingSetting {
                    rule: self.id.clone(),
                    field: "prompt_template",
                }
            })?),
            ContentType::StaticTemplate => Some(self.template.as_deref().ok_or_else(|| {
                ConfigError::MissingSetting {
                    rule: self.id.clone(),
                    field: "template",
                }
            })?),
            ContentType::StructuredTable => {
                if self.columns.is_empty() {
                    return Err(ConfigError::MissingSetting {
                        rule: self.id.clone(),
                        field: "columns",
                    });
                }
                None
            }
            ContentType::TraceabilityAppendix => None,
        };

        if let Some(text) = text {
            let names = placeholders(text).map_err(|source| ConfigError::Template {
                rule: self.id.clone(),
                source,
            })?;
            if let Some(undeclared) = names
                .into_iter()
                .find(|name| !is_builtin(name) && !self.fields.contains(name))
            {
                return Err(ConfigError::UndeclaredField {
                    rule: self.id.clone(),
                    placeholder: undeclared,
                });
            }
        }
        Ok(())
    }
}

/// Retry policy settings for generation calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Ceiling on any single delay
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 4_000,
            max_delay_ms: 10_000,
        }
    }
}

impl RetrySettings {
    /// Retry policy with the default retryable predicate
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts).with_delays(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Source schema requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Fields every entity must have, beyond those of mandatory rules
    pub required_fields: Vec<String>,
}

/// What to do with the document when mandatory grounding fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingFailureMode {
    /// Write the document with a failure banner
    #[default]
    EmitFlagged,
    /// Write nothing
    Suppress,
}

/// Output artifact settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory receiving all artifacts
    pub directory: PathBuf,
    /// Document filename with `{entity}` and `{date}` placeholders
    pub filename_pattern: String,
    /// Write `<stem>_traceability.json`
    pub write_traceability: bool,
    /// Write `<stem>_validation.txt`
    pub write_validation_report: bool,
    /// Behaviour on mandatory grounding failure
    pub on_grounding_failure: GroundingFailureMode,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            filename_pattern: "{entity}_report_{date}.md".to_string(),
            write_traceability: true,
            write_validation_report: true,
            on_grounding_failure: GroundingFailureMode::EmitFlagged,
        }
    }
}

impl OutputSettings {
    /// Set the output directory
    #[inline]
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the grounding failure behaviour
    #[inline]
    #[must_use]
    pub fn with_grounding_failure(mut self, mode: GroundingFailureMode) -> Self {
        self.on_grounding_failure = mode;
        self
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Document template with anchor paragraphs
    pub template: PathBuf,
    /// Insertion rules in document order
    pub rules: Vec<InsertionRule>,
    /// Report pass/fail policy
    pub validation: ValidationPolicy,
    /// Claim extraction heuristics
    pub extraction: ExtractorConfig,
    /// Hedge phrase patterns
    pub hallucination: HallucinationConfig,
    /// Generation retry policy
    pub retry: RetrySettings,
    /// Required source fields
    pub schema: SchemaSettings,
    /// Artifact settings
    pub output: OutputSettings,
    /// Token prices for cost estimates
    pub pricing: TokenPricing,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("templates/report_template.md"),
            rules: Vec::new(),
            validation: ValidationPolicy::default(),
            extraction: ExtractorConfig::default(),
            hallucination: HallucinationConfig::default(),
            retry: RetrySettings::default(),
            schema: SchemaSettings::default(),
            output: OutputSettings::default(),
            pricing: TokenPricing::default(),
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the template path
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = template.into();
        self
    }

    /// Append a rule
    #[inline]
    #[must_use]
    pub fn with_rule(mut self, rule: InsertionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set output settings
    #[inline]
    #[must_use]
    pub fn with_output(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    /// Set retry settings
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Parse and validate YAML
    ///
    /// # Errors
    /// Returns error if the YAML is malformed or the configuration invalid
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a YAML file
    ///
    /// Relative template and output paths are resolved against the
    /// file's directory.
    ///
    /// # Errors
    /// Returns error if the file is unreadable or the configuration invalid
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&yaml)?;
        if let Some(base) = path.parent() {
            if config.template.is_relative() {
                config.template = base.join(&config.template);
            }
            if config.output.directory.is_relative() {
                config.output.directory = base.join(&config.output.directory);
            }
        }
        tracing::info!("Loaded configuration with {} rules from {}", config.rules.len(), path.display());
        Ok(config)
    }

    /// Check every rule and policy
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        let mut anchors = HashSet::new();
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(ConfigError::EmptyValue { index, what: "id" });
            }
            if rule.anchor.trim().is_empty() {
                return Err(ConfigError::EmptyValue { index, what: "anchor" });
            }
            if !ids.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.id.clone()));
            }
            if !anchors.insert(rule.anchor.trim()) {
                return Err(ConfigError::DuplicateAnchor(rule.anchor.clone()));
            }
            rule.validate()?;
        }

        self.validation.validate()?;
        gr_validation::HallucinationDetector::new(&self.hallucination)?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Retry("max_attempts must be at least 1".into()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Retry("max_delay_ms is below base_delay_ms".into()));
        }

        let pattern = &self.output.filename_pattern;
        let names = placeholders(pattern).map_err(|_| ConfigError::FilenamePattern(pattern.clone()))?;
        if names.iter().any(|n| n != "entity" && n != "date") {
            return Err(ConfigError::FilenamePattern(pattern.clone()));
        }
        Ok(())
    }

    /// Rule by id
    #[must_use]
    pub fn rule(&self, id: &str) -> Option<&InsertionRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Configured required fields plus every field of mandatory rules
    #[must_use]
    pub fn required_fields(&self) -> IndexSet<String> {
        let mut required: IndexSet<String> = self.schema.required_fields.iter().cloned().collect();
        for rule in self.rules.iter().filter(|r| r.mandatory) {
            required.extend(rule.source_fields().into_iter().map(str::to_string));
        }
        required
    }

    /// Validator settings derived from this configuration
    #[must_use]
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            extraction: self.extraction.clone(),
            hallucination: self.hallucination.clone(),
            policy: self.validation,
        }
    }
}
