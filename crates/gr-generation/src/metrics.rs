//! Explicit run metrics
//!
//! Each stage owns a [`StageMetrics`] for its duration and hands it back
//! when it finishes; the run collects them into [`RunMetrics`]. Nothing
//! is accumulated through shared state.

use crate::generator::GenerationOutput;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Price per million tokens, in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPricing {
    /// Prompt token price
    pub input_per_million: f64,
    /// Completion token price
    pub output_per_million: f64,
}

impl Default for TokenPricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

impl TokenPricing {
    /// Estimated cost of a token count
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Counters for one pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Stage name
    pub stage: String,
    /// Wall time
    pub elapsed_ms: u64,
    /// Generator calls, including retried attempts
    pub generation_calls: u32,
    /// Attempts beyond the first
    pub retries: u32,
    /// Prompt tokens of successful calls
    pub input_tokens: u64,
    /// Completion tokens of successful calls
    pub output_tokens: u64,
}

impl StageMetrics {
    /// Empty counters for `stage`
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Self::default()
        }
    }

    /// Account for one generation that took `attempts` calls
    pub fn record_attempts(&mut self, attempts: u32) {
        self.generation_calls += attempts;
        self.retries += attempts.saturating_sub(1);
    }

    /// Account for the token usage of a successful call
    pub fn record_output(&mut self, output: &GenerationOutput) {
        self.input_tokens += output.input_tokens;
        self.output_tokens += output.output_tokens;
    }
}

/// Times a stage and owns its counters until it finishes
#[derive(Debug)]
pub struct StageTimer {
    started: Instant,
    metrics: StageMetrics,
}

impl StageTimer {
    /// Start timing `stage`
    #[must_use]
    pub fn start(stage: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            metrics: StageMetrics::new(stage),
        }
    }

    /// Counters of the running stage
    pub fn metrics_mut(&mut self) -> &mut StageMetrics {
        &mut self.metrics
    }

    /// Stop the clock and return the counters
    #[must_use]
    pub fn finish(mut self) -> StageMetrics {
        self.metrics.elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics
    }
}

/// Metrics of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Finished stages in execution order
    pub stages: Vec<StageMetrics>,
    /// Pricing used for the cost estimate
    pub pricing: TokenPricing,
}

impl RunMetrics {
    /// Create with the given pricing
    #[must_use]
    pub fn new(pricing: TokenPricing) -> Self {
        Self {
            stages: Vec::new(),
            pricing,
        }
    }

    /// Append a finished stage
    pub fn push(&mut self, stage: StageMetrics) {
        self.stages.push(stage);
    }

    /// Metrics of a stage by name
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageMetrics> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Sum of stage wall times
    #[must_use]
    pub fn total_elapsed_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.elapsed_ms).sum()
    }

    /// Generator calls across stages
    #[must_use]
    pub fn generation_calls(&self) -> u32 {
        self.stages.iter().map(|s| s.generation_calls).sum()
    }

    /// Retries across stages
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.stages.iter().map(|s| s.retries).sum()
    }

    /// Prompt tokens across stages
    #[must_use]
    pub fn input_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.input_tokens).sum()
    }

    /// Completion tokens across stages
    #[must_use]
    pub fn output_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.output_tokens).sum()
    }

    /// Estimated cost in USD
    #[must_use]
    pub fn estimated_cost_usd(&self) -> f64 {
        self.pricing.cost(self.input_tokens(), self.output_tokens())
    }
}
