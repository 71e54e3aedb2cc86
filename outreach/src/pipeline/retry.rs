//! Retry policies and the executor that applies them to external calls.
//!
//! Every adapter call goes through [`RetryExecutor::execute`], which retries
//! `RetryableFailure` results with exponential backoff and jitter, returns
//! `PermanentFailure` immediately, and records each attempt.

use crate::cancellation::{CancellationToken, CAMPAIGN_CANCELLED};
use crate::core::{AttemptOutcome, Failure, Stage, StageAttempt, StageResult};
use crate::errors::{ConfigError, FailureKind, PolicyError};
use crate::events::{EventSink, NoOpEventSink, STAGE_ATTEMPT};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Adapter category a retry policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    /// Message generation (AI provider).
    AiGeneration,
    /// Lead storage (lead source).
    DataStore,
    /// Email transport.
    Email,
    /// Task tracker.
    TaskStore,
}

impl PolicyCategory {
    /// Returns the category name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiGeneration => "ai_generation",
            Self::DataStore => "data_store",
            Self::Email => "email",
            Self::TaskStore => "task_store",
        }
    }
}

/// Retry parameters for one adapter category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound on any delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Fraction of the delay added or removed at random (0.0..=1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter fraction.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Checks the policy is usable.
    pub fn validate(&self, name: &str) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::new(name, "max_attempts must be at least 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(PolicyError::new(name, "multiplier must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(PolicyError::new(name, "jitter must be within 0.0..=1.0"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(PolicyError::new(name, "base_delay_ms must not exceed max_delay_ms"));
        }
        Ok(())
    }

    /// Uncapped delay after attempt `attempt` (1-based), in milliseconds.
    ///
    /// `base * multiplier^(attempt-1)`; may be infinite for large attempts.
    fn raw_delay_ms(&self, attempt: u32) -> f64 {
        if self.base_delay_ms == 0 {
            return 0.0;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        delay
    }

    /// Un-jittered delay after attempt `attempt` (1-based), in milliseconds.
    ///
    /// `min(base * multiplier^(attempt-1), max)`.
    #[must_use]
    pub fn nominal_delay_ms(&self, attempt: u32) -> f64 {
        let delay = self.raw_delay_ms(attempt);
        #[allow(clippy::cast_precision_loss)]
        let max = self.max_delay_ms as f64;
        if delay.is_finite() {
            delay.min(max)
        } else {
            max
        }
    }

    /// Jittered delay after attempt `attempt`, drawn with `rng`.
    ///
    /// Jitter scales the uncapped delay; the result is then capped at
    /// `max_delay_ms`.
    pub fn delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let factor = if self.jitter > 0.0 {
            1.0 + rng.gen_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        #[allow(clippy::cast_precision_loss)]
        let max = self.max_delay_ms as f64;
        let jittered = self.raw_delay_ms(attempt) * factor;
        let capped = if jittered.is_finite() { jittered.clamp(0.0, max) } else { max };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = (capped * 1_000_000.0).round() as u64;
        Duration::from_nanos(nanos)
    }

    /// Jittered delay after attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}

/// One retry policy per adapter category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    /// Message generation.
    pub ai_generation: RetryPolicy,
    /// Lead source listing.
    pub data_store: RetryPolicy,
    /// Email transport.
    pub email: RetryPolicy,
    /// Task creation.
    pub task_store: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            ai_generation: RetryPolicy::new().with_max_attempts(4).with_base_delay_ms(1000),
            data_store: RetryPolicy::new().with_max_attempts(3).with_base_delay_ms(500),
            email: RetryPolicy::new().with_max_attempts(3).with_base_delay_ms(2000),
            task_store: RetryPolicy::new().with_max_attempts(3).with_base_delay_ms(1000),
        }
    }
}

impl RetryPolicies {
    /// Uses the same policy for every category.
    #[must_use]
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            ai_generation: policy.clone(),
            data_store: policy.clone(),
            email: policy.clone(),
            task_store: policy,
        }
    }

    /// Returns the policy for a category.
    #[must_use]
    pub fn get(&self, category: PolicyCategory) -> &RetryPolicy {
        match category {
            PolicyCategory::AiGeneration => &self.ai_generation,
            PolicyCategory::DataStore => &self.data_store,
            PolicyCategory::Email => &self.email,
            PolicyCategory::TaskStore => &self.task_store,
        }
    }

    /// Validates every policy.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for category in [
            PolicyCategory::AiGeneration,
            PolicyCategory::DataStore,
            PolicyCategory::Email,
            PolicyCategory::TaskStore,
        ] {
            self.get(category).validate(category.as_str())?;
        }
        Ok(())
    }

    /// Loads policies from a JSON file. Missing categories keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let policies: Self = serde_json::from_str(&raw)?;
        policies
            .validate()
            .map_err(|e| ConfigError::invalid(e.policy, e.reason))?;
        Ok(policies)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Retries are exhausted, give up.
    GiveUp,
    /// The result is final (success or permanent failure).
    Done,
}

/// Decides what follows attempt `attempt` given its result.
#[must_use]
pub fn should_retry<T>(policy: &RetryPolicy, attempt: u32, result: &StageResult<T>) -> RetryDecision {
    match result {
        StageResult::Success(_) | StageResult::PermanentFailure(_) => RetryDecision::Done,
        StageResult::RetryableFailure(_) if attempt >= policy.max_attempts => RetryDecision::GiveUp,
        StageResult::RetryableFailure(_) => RetryDecision::Retry(policy.delay_for(attempt)),
    }
}

/// Identifies the external call being retried, for logs and events.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    /// Operation name.
    pub operation: &'a str,
    /// Lead the call is made for, if any.
    pub lead_id: Option<&'a str>,
}

impl<'a> CallSite<'a> {
    /// A call not tied to a lead.
    #[must_use]
    pub fn new(operation: &'a str) -> Self {
        Self {
            operation,
            lead_id: None,
        }
    }

    /// A pipeline stage call for a lead.
    #[must_use]
    pub fn stage(stage: Stage, lead_id: &'a str) -> Self {
        Self {
            operation: stage.as_str(),
            lead_id: Some(lead_id),
        }
    }
}

/// Record of one attempt made by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Outcome tag.
    pub outcome: AttemptOutcome,
    /// Time spent in the call.
    pub duration: Duration,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// Failure detail, for failed attempts.
    pub failure: Option<Failure>,
    /// Backoff applied after this attempt.
    pub delay_before_next: Option<Duration>,
}

impl AttemptReport {
    /// Converts into a lead log entry for `stage`.
    #[must_use]
    pub fn into_stage_attempt(self, stage: Stage) -> StageAttempt {
        let (kind, error) = match self.failure {
            Some(failure) => (Some(failure.kind), Some(failure.reason)),
            None => (None, None),
        };
        StageAttempt {
            stage,
            attempt: self.attempt,
            outcome: self.outcome,
            duration: self.duration,
            started_at: self.started_at,
            kind,
            error,
            delay_before_next: self.delay_before_next,
        }
    }
}

/// Final result of a retried call plus every attempt made.
#[derive(Debug, Clone)]
pub struct Execution<T> {
    /// Final result. Exhausted retries return the last retryable failure.
    pub result: StageResult<T>,
    /// Attempts in order.
    pub attempts: Vec<AttemptReport>,
}

impl<T> Execution<T> {
    /// Number of attempts made.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }

    /// Converts the attempts into lead log entries for `stage`.
    pub fn stage_attempts(&mut self, stage: Stage) -> Vec<StageAttempt> {
        self.attempts
            .drain(..)
            .map(|a| a.into_stage_attempt(stage))
            .collect()
    }
}

/// Counter snapshot for a [`RetryExecutor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStats {
    /// Calls made, retries included.
    pub attempts: u64,
    /// Retries scheduled after a retryable failure.
    pub retries: u64,
    /// Calls that ran out of attempts.
    pub exhausted: u64,
}

/// Applies a [`RetryPolicy`] to single external calls.
pub struct RetryExecutor {
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    call_timeout: Option<Duration>,
    attempts: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(NoOpEventSink), Arc::new(CancellationToken::new()))
    }
}

impl RetryExecutor {
    /// Creates an executor emitting to `sink` and honouring `cancel`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, cancel: Arc<CancellationToken>) -> Self {
        Self {
            sink,
            cancel,
            call_timeout: None,
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Bounds every attempt by `timeout`.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns a counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RetryStats {
        RetryStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Runs `operation` under `policy`.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        call: CallSite<'_>,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Execution<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = StageResult<T>>,
    {
        let mut attempts = Vec::new();
        let mut attempt = 1;

        loop {
            if self.cancel.is_cancelled() {
                return Execution {
                    result: cancelled(),
                    attempts,
                };
            }

            let started_at = Utc::now();
            let start = Instant::now();
            let result = match self.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                    Ok(result) => result,
                    Err(_) => StageResult::retryable(
                        FailureKind::Transport,
                        format!("call timed out after {}ms", limit.as_millis()),
                    ),
                },
                None => operation(attempt).await,
            };
            let duration = start.elapsed();
            self.attempts.fetch_add(1, Ordering::Relaxed);

            let decision = should_retry(policy, attempt, &result);
            let delay = match decision {
                RetryDecision::Retry(delay) => Some(delay),
                RetryDecision::GiveUp | RetryDecision::Done => None,
            };
            self.observe(call, attempt, &result, duration, delay);
            attempts.push(AttemptReport {
                attempt,
                outcome: result.outcome(),
                duration,
                started_at,
                failure: result.failure().cloned(),
                delay_before_next: delay,
            });

            match decision {
                RetryDecision::Done => return Execution { result, attempts },
                RetryDecision::GiveUp => {
                    self.exhausted.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        operation = call.operation,
                        lead_id = call.lead_id,
                        attempts = attempt,
                        "Retries exhausted"
                    );
                    return Execution { result, attempts };
                }
                RetryDecision::Retry(delay) => {
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.cancel.cancelled() => {
                            return Execution { result: cancelled(), attempts };
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn observe<T>(
        &self,
        call: CallSite<'_>,
        attempt: u32,
        result: &StageResult<T>,
        duration: Duration,
        delay: Option<Duration>,
    ) {
        let delay_ms = delay.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        let error = result.failure().map(ToString::to_string);
        debug!(
            operation = call.operation,
            lead_id = call.lead_id,
            attempt,
            outcome = %result.outcome(),
            duration_ms = duration.as_secs_f64() * 1000.0,
            delay_ms,
            error = error.as_deref(),
            "Attempt finished"
        );
        self.sink.try_emit(
            STAGE_ATTEMPT,
            Some(serde_json::json!({
                "operation": call.operation,
                "lead_id": call.lead_id,
                "attempt": attempt,
                "outcome": result.outcome(),
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "delay_ms": delay_ms,
                "error": error,
            })),
        );
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("call_timeout", &self.call_timeout)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn cancelled<T>() -> StageResult<T> {
    StageResult::permanent(FailureKind::Cancelled, CAMPAIGN_CANCELLED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicU32;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
            .with_jitter(0.0)
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert!(policy.validate("default").is_ok());
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::new().with_max_attempts(0).validate("x").is_err());
        assert!(RetryPolicy::new().with_multiplier(0.5).validate("x").is_err());
        assert!(RetryPolicy::new().with_jitter(1.5).validate("x").is_err());
        let err = RetryPolicy::new()
            .with_base_delay_ms(10_000)
            .with_max_delay_ms(100)
            .validate("email")
            .unwrap_err();
        assert_eq!(err.policy, "email");
    }

    #[test]
    fn test_nominal_delay_exponential() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_multiplier(2.0)
            .with_max_delay_ms(10_000);

        assert!((policy.nominal_delay_ms(1) - 100.0).abs() < f64::EPSILON);
        assert!((policy.nominal_delay_ms(2) - 200.0).abs() < f64::EPSILON);
        assert!((policy.nominal_delay_ms(3) - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nominal_delay_capped_at_max() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(1000)
            .with_multiplier(3.0)
            .with_max_delay_ms(5000);

        assert!((policy.nominal_delay_ms(10) - 5000.0).abs() < f64::EPSILON);
        assert!((policy.nominal_delay_ms(u32::MAX) - 5000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(200)
            .with_multiplier(1.5)
            .with_max_delay_ms(1000)
            .with_jitter(0.25);
        let mut rng = StdRng::seed_from_u64(7);

        for attempt in 1..=8 {
            let raw = 200.0 * 1.5_f64.powi(attempt as i32 - 1);
            let low = (raw * 0.75).min(1000.0);
            let high = (raw * 1.25).min(1000.0);
            for _ in 0..200 {
                let ms = policy.delay_with(attempt, &mut rng).as_secs_f64() * 1000.0;
                assert!(ms >= low - 1e-6, "attempt {attempt}: {ms} < {low}");
                assert!(ms <= high + 1e-6, "attempt {attempt}: {ms} > {high}");
            }
        }
    }

    #[test]
    fn test_jitter_applies_before_cap() {
        // raw 1200ms against a 1000ms cap: 1200 * 0.9 = 1080 is still over the cap.
        let policy = RetryPolicy::new()
            .with_base_delay_ms(300)
            .with_multiplier(2.0)
            .with_max_delay_ms(1000)
            .with_jitter(0.1);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            assert_eq!(policy.delay_with(3, &mut rng), Duration::from_millis(1000));
        }
        assert_eq!(policy.delay_with(u32::MAX, &mut rng), Duration::from_millis(1000));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = RetryPolicy::new().with_base_delay_ms(50).with_jitter(0.0);
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
    }

    #[test]
    fn test_should_retry_decisions() {
        let policy = fast_policy(2);
        let retry: StageResult<()> = StageResult::retryable(FailureKind::RateLimit, "429");
        let perm: StageResult<()> = StageResult::permanent(FailureKind::Auth, "401");

        assert!(matches!(should_retry(&policy, 1, &retry), RetryDecision::Retry(_)));
        assert_eq!(should_retry(&policy, 2, &retry), RetryDecision::GiveUp);
        assert_eq!(should_retry(&policy, 1, &perm), RetryDecision::Done);
        assert_eq!(should_retry(&policy, 1, &StageResult::Success(())), RetryDecision::Done);
    }

    #[test]
    fn test_policies_default_per_category() {
        let policies = RetryPolicies::default();
        assert_eq!(policies.get(PolicyCategory::AiGeneration).max_attempts, 4);
        assert_eq!(policies.get(PolicyCategory::DataStore).base_delay_ms, 500);
        assert_eq!(policies.get(PolicyCategory::Email).base_delay_ms, 2000);
        assert!(policies.validate().is_ok());
    }

    #[test]
    fn test_policies_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.json");
        std::fs::write(
            &path,
            r#"{"email": {"max_attempts": 5, "base_delay_ms": 250, "jitter": 0.0}}"#,
        )
        .unwrap();

        let policies = RetryPolicies::from_json_file(&path).unwrap();
        assert_eq!(policies.email.max_attempts, 5);
        assert_eq!(policies.email.base_delay_ms, 250);
        assert!((policies.email.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(policies.ai_generation, RetryPolicies::default().ai_generation);
    }

    #[test]
    fn test_policies_from_json_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.json");
        std::fs::write(&path, r#"{"task_store": {"max_attempts": 0}}"#).unwrap();

        let err = RetryPolicies::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "task_store"));
    }

    #[tokio::test]
    async fn test_execute_success_first_try() {
        let executor = RetryExecutor::default();
        let execution = executor
            .execute(CallSite::new("test"), &fast_policy(3), |_| async {
                StageResult::Success(42)
            })
            .await;

        assert_eq!(execution.result, StageResult::Success(42));
        assert_eq!(execution.attempt_count(), 1);
        assert_eq!(executor.stats().retries, 0);
    }

    #[tokio::test]
    async fn test_execute_success_after_retryable_failures() {
        let executor = RetryExecutor::default();
        let calls = AtomicU32::new(0);

        let execution = executor
            .execute(CallSite::new("test"), &fast_policy(3), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        StageResult::retryable(FailureKind::Transport, format!("reset {attempt}"))
                    } else {
                        StageResult::Success("sent")
                    }
                }
            })
            .await;

        assert_eq!(execution.result, StageResult::Success("sent"));
        assert_eq!(execution.attempt_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            execution.attempts.iter().map(|a| a.outcome).collect::<Vec<_>>(),
            vec![
                AttemptOutcome::RetryableFailure,
                AttemptOutcome::RetryableFailure,
                AttemptOutcome::Success
            ]
        );
        assert!(execution.attempts[0].delay_before_next.is_some());
        assert!(execution.attempts[2].delay_before_next.is_none());
        assert_eq!(executor.stats(), RetryStats { attempts: 3, retries: 2, exhausted: 0 });
    }

    #[tokio::test]
    async fn test_execute_exhausted_returns_last_retryable() {
        let executor = RetryExecutor::default();
        let execution: Execution<()> = executor
            .execute(CallSite::new("test"), &fast_policy(3), |attempt| async move {
                StageResult::retryable(FailureKind::RateLimit, format!("429 #{attempt}"))
            })
            .await;

        assert_eq!(
            execution.result,
            StageResult::RetryableFailure(Failure::new(FailureKind::RateLimit, "429 #3"))
        );
        assert_eq!(execution.attempt_count(), 3);
        assert_eq!(executor.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn test_execute_permanent_failure_not_retried() {
        let executor = RetryExecutor::default();
        let calls = AtomicU32::new(0);

        let execution: Execution<()> = executor
            .execute(CallSite::new("test"), &fast_policy(5), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { StageResult::permanent(FailureKind::Auth, "401 Unauthorized") }
            })
            .await;

        assert!(matches!(execution.result, StageResult::PermanentFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_call_timeout_is_retryable() {
        let executor = RetryExecutor::default().with_call_timeout(Duration::from_millis(10));
        let execution: Execution<()> = executor
            .execute(CallSite::new("slow"), &fast_policy(2), |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StageResult::Success(())
            })
            .await;

        let failure = execution.result.failure().unwrap();
        assert!(execution.result.is_retryable());
        assert_eq!(failure.kind, FailureKind::Transport);
        assert_eq!(execution.attempt_count(), 2);
    }

    #[tokio::test]
    async fn test_execute_cancelled_during_backoff() {
        let cancel = Arc::new(CancellationToken::new());
        let executor = RetryExecutor::new(Arc::new(NoOpEventSink), cancel.clone());
        let policy = RetryPolicy::new()
            .with_max_attempts(5)
            .with_base_delay_ms(10_000)
            .with_max_delay_ms(10_000)
            .with_jitter(0.0);

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel("deadline");
            })
        };

        let execution: Execution<()> = tokio::time::timeout(
            Duration::from_secs(2),
            executor.execute(CallSite::new("test"), &policy, |_| async {
                StageResult::retryable(FailureKind::Transport, "reset")
            }),
        )
        .await
        .expect("backoff should be interrupted");
        canceller.await.unwrap();

        let failure = execution.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.reason, CAMPAIGN_CANCELLED);
        assert_eq!(execution.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_emits_attempt_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let executor = RetryExecutor::new(sink.clone(), Arc::new(CancellationToken::new()));

        let _ = executor
            .execute(CallSite::stage(Stage::SendEmail, "lead-1"), &fast_policy(2), |attempt| async move {
                if attempt == 1 {
                    StageResult::retryable(FailureKind::Transport, "421")
                } else {
                    StageResult::Success(())
                }
            })
            .await;

        let events = sink.events_of_type(STAGE_ATTEMPT);
        assert_eq!(events.len(), 2);
        let first = events[0].1.as_ref().unwrap();
        assert_eq!(first["operation"], "send_email");
        assert_eq!(first["lead_id"], "lead-1");
        assert_eq!(first["attempt"], 1);
        assert_eq!(first["outcome"], "retryable_failure");
        assert_eq!(first["delay_ms"], 1);
    }
}
