//! Drives one lead through validate, generate, send, and create-task.

use super::retry::{AttemptReport, CallSite, Execution, RetryExecutor, RetryPolicies};
use super::validation::validate_lead;
use crate::adapters::{email_subject, Adapters, ClientInfo, TaskPriority};
use crate::cancellation::{CancellationToken, CAMPAIGN_CANCELLED};
use crate::core::{Failure, Lead, Stage, StageResult, StageTiming};
use crate::errors::FailureKind;
use crate::events::{EventSink, LEAD_COMPLETED, STAGE_COMPLETED, STAGE_FAILED};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Offer text used when none is configured.
pub const DEFAULT_OFFER: &str =
    "cutting-edge digital marketing solutions that increase qualified leads by 30% in 90 days";

/// Campaign-level inputs to message generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachContent {
    /// Who the campaign is sent on behalf of.
    pub client: ClientInfo,
    /// The service being offered.
    pub offer: String,
}

impl Default for OutreachContent {
    fn default() -> Self {
        Self {
            client: ClientInfo::default(),
            offer: DEFAULT_OFFER.to_string(),
        }
    }
}

/// Priority and due date applied to every follow-up task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Task priority, if the tracker should get one.
    pub priority: Option<TaskPriority>,
    /// Days from task creation until it is due.
    pub due_in_days: Option<u32>,
}

impl TaskSettings {
    /// Due date relative to `now`.
    #[must_use]
    pub fn due_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.due_in_days
            .map(|days| now + chrono::Duration::days(i64::from(days)))
    }
}

/// Remembers adapters whose credentials were rejected.
///
/// When enabled, the first `Auth` permanent failure from an adapter trips it
/// and every later call to that adapter fails without being made.
#[derive(Debug, Default)]
pub struct AuthBreaker {
    enabled: bool,
    tripped: Mutex<HashMap<Stage, String>>,
}

impl AuthBreaker {
    /// Creates a breaker. A disabled breaker never trips.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tripped: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the breaker is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the failure to record if `stage`'s adapter is tripped.
    #[must_use]
    pub fn check(&self, stage: Stage) -> Option<Failure> {
        if !self.enabled {
            return None;
        }
        self.tripped.lock().get(&stage).map(|reason| {
            Failure::new(
                FailureKind::Auth,
                format!("skipped after earlier auth failure: {reason}"),
            )
        })
    }

    /// Trips the breaker for `stage` on an auth rejection.
    pub fn observe<T>(&self, stage: Stage, result: &StageResult<T>) {
        if !self.enabled {
            return;
        }
        if let StageResult::PermanentFailure(failure) = result {
            if failure.kind == FailureKind::Auth {
                let mut tripped = self.tripped.lock();
                if !tripped.contains_key(&stage) {
                    warn!(stage = %stage, reason = %failure.reason, "Adapter credentials rejected, halting stage for remaining leads");
                    tripped.insert(stage, failure.reason.clone());
                }
            }
        }
    }

    /// Stages whose adapter is tripped.
    #[must_use]
    pub fn tripped(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self.tripped.lock().keys().copied().collect();
        stages.sort();
        stages
    }
}

/// Everything a pipeline needs, shared read-only across workers.
pub struct PipelineResources {
    adapters: Adapters,
    policies: RetryPolicies,
    content: OutreachContent,
    task_settings: TaskSettings,
    executor: RetryExecutor,
    sink: Arc<dyn EventSink>,
    breaker: AuthBreaker,
}

impl PipelineResources {
    /// Creates resources with default policies and content.
    #[must_use]
    pub fn new(adapters: Adapters, sink: Arc<dyn EventSink>, cancel: Arc<CancellationToken>) -> Self {
        Self {
            adapters,
            policies: RetryPolicies::default(),
            content: OutreachContent::default(),
            task_settings: TaskSettings::default(),
            executor: RetryExecutor::new(sink.clone(), cancel),
            sink,
            breaker: AuthBreaker::default(),
        }
    }

    /// Sets the retry policies.
    #[must_use]
    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Sets the outreach content.
    #[must_use]
    pub fn with_content(mut self, content: OutreachContent) -> Self {
        self.content = content;
        self
    }

    /// Sets task priority and due date.
    #[must_use]
    pub fn with_task_settings(mut self, settings: TaskSettings) -> Self {
        self.task_settings = settings;
        self
    }

    /// Bounds every external call.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.executor = self.executor.with_call_timeout(timeout);
        self
    }

    /// Enables the auth short-circuit.
    #[must_use]
    pub fn with_halt_on_auth_failure(mut self, enabled: bool) -> Self {
        self.breaker = AuthBreaker::new(enabled);
        self
    }

    /// The adapters.
    #[must_use]
    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    /// The retry policies.
    #[must_use]
    pub fn policies(&self) -> &RetryPolicies {
        &self.policies
    }

    /// The shared retry executor.
    #[must_use]
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// The event sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// The auth breaker.
    #[must_use]
    pub fn breaker(&self) -> &AuthBreaker {
        &self.breaker
    }

    /// The campaign cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        self.executor.cancel_token()
    }
}

impl std::fmt::Debug for PipelineResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineResources")
            .field("policies", &self.policies)
            .field("content", &self.content)
            .field("task_settings", &self.task_settings)
            .field("executor", &self.executor)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

struct StageClock {
    started_at: DateTime<Utc>,
    start: Instant,
}

impl StageClock {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }
}

/// Runs a single lead through the stage sequence.
///
/// A stage runs only if the previous one succeeded. The first terminal
/// failure moves the lead to `Failed` and ends the run.
#[derive(Debug, Clone)]
pub struct LeadPipeline {
    resources: Arc<PipelineResources>,
}

impl LeadPipeline {
    /// Creates a pipeline over shared resources.
    #[must_use]
    pub fn new(resources: Arc<PipelineResources>) -> Self {
        Self { resources }
    }

    /// Processes `lead` and returns it in a terminal status.
    pub async fn run(&self, mut lead: Lead) -> Lead {
        self.run_stages(&mut lead).await;

        let failure = lead.failure();
        self.resources.sink.try_emit(
            LEAD_COMPLETED,
            Some(serde_json::json!({
                "lead_id": lead.id,
                "status": lead.status(),
                "failed_stage": failure.and_then(|f| f.stage),
                "reason": failure.map(|f| f.reason.as_str()),
            })),
        );
        lead
    }

    async fn run_stages(&self, lead: &mut Lead) {
        let r = &*self.resources;

        let clock = StageClock::begin();
        let validation = validate_lead(lead);
        let execution = Execution {
            attempts: vec![AttemptReport {
                attempt: 1,
                outcome: validation.outcome(),
                duration: clock.start.elapsed(),
                started_at: clock.started_at,
                failure: validation.failure().cloned(),
                delay_before_next: None,
            }],
            result: validation,
        };
        if self.settle(lead, Stage::Validate, execution, &clock).is_none() {
            return;
        }

        if !self.gate(lead, Stage::GenerateMessage) {
            return;
        }
        let clock = StageClock::begin();
        let execution = {
            let (target, generator, content) = (&*lead, &r.adapters.generator, &r.content);
            r.executor
                .execute(
                    CallSite::stage(Stage::GenerateMessage, &target.id),
                    &r.policies.ai_generation,
                    move |_| generator.generate(target, &content.client, &content.offer),
                )
                .await
        };
        let Some(message) = self.settle(lead, Stage::GenerateMessage, execution, &clock) else {
            return;
        };
        lead.set_message(message);

        if !self.gate(lead, Stage::SendEmail) {
            return;
        }
        let clock = StageClock::begin();
        let execution = {
            let target = &*lead;
            let email = &r.adapters.email;
            let subject = email_subject(&target.company);
            let subject = subject.as_str();
            let body = target.message().unwrap_or_default();
            r.executor
                .execute(
                    CallSite::stage(Stage::SendEmail, &target.id),
                    &r.policies.email,
                    move |_| email.send(&target.email, subject, body),
                )
                .await
        };
        if self.settle(lead, Stage::SendEmail, execution, &clock).is_none() {
            return;
        }

        if !self.gate(lead, Stage::CreateTask) {
            return;
        }
        let clock = StageClock::begin();
        let execution = {
            let (target, tasks) = (&*lead, &r.adapters.tasks);
            let priority = r.task_settings.priority;
            let due_date = r.task_settings.due_date(Utc::now());
            r.executor
                .execute(
                    CallSite::stage(Stage::CreateTask, &target.id),
                    &r.policies.task_store,
                    move |_| tasks.create_task(target, priority, due_date),
                )
                .await
        };
        if let Some(task) = self.settle(lead, Stage::CreateTask, execution, &clock) {
            info!(lead_id = %lead.id, task_id = %task.id, "Follow-up task created");
        }
    }

    /// Checks cancellation and the auth breaker before an adapter stage.
    fn gate(&self, lead: &mut Lead, stage: Stage) -> bool {
        let failure = if self.resources.cancel_token().is_cancelled() {
            Some(Failure::new(FailureKind::Cancelled, CAMPAIGN_CANCELLED))
        } else {
            self.resources.breaker.check(stage)
        };
        match failure {
            Some(failure) => {
                self.fail(lead, stage, failure, 0);
                false
            }
            None => true,
        }
    }

    /// Folds a finished stage into the lead. Returns the payload on success.
    fn settle<T>(
        &self,
        lead: &mut Lead,
        stage: Stage,
        mut execution: Execution<T>,
        clock: &StageClock,
    ) -> Option<T> {
        let attempts = execution.attempt_count();
        let duration = clock.start.elapsed();
        lead.record_timing(StageTiming {
            stage,
            started_at: clock.started_at,
            finished_at: Utc::now(),
            duration,
            attempts,
            outcome: execution.result.outcome(),
        });
        lead.record_attempts(execution.stage_attempts(stage));
        self.resources.breaker.observe(stage, &execution.result);

        match execution.result {
            StageResult::Success(payload) => {
                if let Err(err) = lead.complete_stage(stage) {
                    error!(lead_id = %lead.id, error = %err, "Rejected stage transition");
                    self.fail(lead, stage, Failure::new(FailureKind::Internal, err.to_string()), attempts);
                    return None;
                }
                info!(
                    lead_id = %lead.id,
                    stage = %stage,
                    attempts,
                    duration_ms = duration.as_secs_f64() * 1000.0,
                    "Stage completed"
                );
                self.resources.sink.try_emit(
                    STAGE_COMPLETED,
                    Some(serde_json::json!({
                        "lead_id": lead.id,
                        "stage": stage,
                        "attempts": attempts,
                        "duration_ms": duration.as_secs_f64() * 1000.0,
                    })),
                );
                Some(payload)
            }
            StageResult::RetryableFailure(failure) | StageResult::PermanentFailure(failure) => {
                self.fail(lead, stage, failure, attempts);
                None
            }
        }
    }

    fn fail(&self, lead: &mut Lead, stage: Stage, failure: Failure, attempts: u32) {
        warn!(
            lead_id = %lead.id,
            stage = %stage,
            kind = %failure.kind,
            reason = %failure.reason,
            attempts,
            "Lead failed"
        );
        self.resources.sink.try_emit(
            STAGE_FAILED,
            Some(serde_json::json!({
                "lead_id": lead.id,
                "stage": stage,
                "kind": failure.kind,
                "reason": failure.reason,
                "attempts": attempts,
            })),
        );
        if let Err(err) = lead.fail(Some(stage), failure) {
            error!(lead_id = %lead.id, error = %err, "Lead already terminal");
        }
    }
}
