//! Retry policy for generation calls
//!
//! Bounded exponential backoff as a standalone value: attempt cap, base
//! delay, delay ceiling and a retryable-error predicate. The policy knows
//! nothing about generators; [`RetryingGenerator`] binds it to one.

use crate::generator::{GenerationOutput, TextGenerator};
use crate::metrics::StageMetrics;
use crate::prompt::PromptContext;
use gr_core::GenerationError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether an error is worth another attempt
pub type RetryPredicate = fn(&GenerationError) -> bool;

/// Bounded exponential backoff
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Retryable-error predicate
    pub retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            retryable: GenerationError::is_retryable,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

/// Result of a retried operation and how many attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// Final result
    pub result: Result<T, GenerationError>,
    /// Attempts made, at least 1
    pub attempts: u32,
}

impl RetryPolicy {
    /// Create a policy with default delays
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self::default().with_max_attempts(max_attempts)
    }

    /// Set the attempt cap
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set base and ceiling delays
    #[inline]
    #[must_use]
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    /// Replace the retryable-error predicate
    #[inline]
    #[must_use]
    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay`
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently or the cap is hit
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) if attempt < max_attempts && (self.retryable)(&err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

/// A generator wrapped in a retry policy
#[derive(Clone)]
pub struct RetryingGenerator {
    inner: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingGenerator")
            .field("inner", &self.inner.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryingGenerator {
    /// Wrap `inner` with `policy`
    #[must_use]
    pub fn new(inner: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Policy in effect
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate with retries, recording calls and tokens into `metrics`
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted or the error is
    /// not retryable
    pub async fn generate(
        &self,
        prompt: &str,
        context: &PromptContext,
        metrics: &mut StageMetrics,
    ) -> Result<GenerationOutput, GenerationError> {
        let inner = &self.inner;
        let outcome = self
            .policy
            .execute(|| inner.generate(prompt, context))
            .await;

        metrics.record_attempts(outcome.attempts);
        match &outcome.result {
            Ok(output) => metrics.record_output(output),
            Err(err) => tracing::error!(
                "Generation for `{}` failed after {} attempt(s): {}",
                context.rule_id,
                outcome.attempts,
                err
            ),
        }
        outcome.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;
    use proptest::prelude::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_delays(Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn default_policy_backs_off_to_ceiling() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let scripted = ScriptedGenerator::new()
            .with_response("summary", "done")
            .with_error("summary", GenerationError::RateLimited("429".into()))
            .with_error("summary", GenerationError::Timeout { duration_secs: 30 });
        let scripted = Arc::new(scripted);
        let generator = RetryingGenerator::new(scripted.clone(), fast(3));
        let mut metrics = StageMetrics::new("generating");

        let out = generator
            .generate("p", &PromptContext::new("Acme", "summary"), &mut metrics)
            .await
            .unwrap();

        assert_eq!(out.text, "done");
        assert_eq!(scripted.calls(), 3);
        assert_eq!(metrics.generation_calls, 3);
        assert_eq!(metrics.retries, 2);
    }

    #[tokio::test]
    async fn attempt_cap_is_respected() {
        let scripted = ScriptedGenerator::new().with_response("summary", "never reached");
        for _ in 0..3 {
            scripted.push("summary", Err(GenerationError::RateLimited("429".into())));
        }
        let scripted = Arc::new(scripted);
        let generator = RetryingGenerator::new(scripted.clone(), fast(2));
        let mut metrics = StageMetrics::new("generating");

        let err = generator
            .generate("p", &PromptContext::new("Acme", "summary"), &mut metrics)
            .await
            .unwrap_err();

        assert_eq!(err, GenerationError::RateLimited("429".into()));
        assert_eq!(scripted.calls(), 2);
        assert_eq!(metrics.input_tokens, 0);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let outcome = fast(5)
            .execute(|| async { Err::<(), _>(GenerationError::AuthError("bad key".into())) })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.is_err());
    }

    #[tokio::test]
    async fn custom_predicate_controls_retries() {
        let policy = fast(4).with_predicate(|_| true);
        let mut calls = 0;
        let outcome = policy
            .execute(|| {
                calls += 1;
                let result = if calls < 3 {
                    Err(GenerationError::InvalidResponse("empty".into()))
                } else {
                    Ok(calls)
                };
                async move { result }
            })
            .await;
        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.attempts, 3);
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_ceiling(
            base_ms in 1u64..5_000,
            max_ms in 1u64..20_000,
            retry in 1u32..64,
        ) {
            let policy = RetryPolicy::default()
                .with_delays(Duration::from_millis(base_ms), Duration::from_millis(max_ms));
            let delay = policy.delay_for(retry);
            prop_assert!(delay <= policy.max_delay);
            prop_assert!(delay >= policy.base_delay.min(policy.max_delay));
        }
    }
}
