//! Lead record and its per-stage attempt log.

use super::{AttemptOutcome, Failure, LeadStatus, Stage};
use crate::errors::{FailureKind, TransitionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One invocation of an external call (or of validation) for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAttempt {
    /// Stage the attempt belongs to.
    pub stage: Stage,
    /// 1-based attempt number within the stage.
    pub attempt: u32,
    /// Outcome tag.
    pub outcome: AttemptOutcome,
    /// Wall-clock time spent in the call.
    pub duration: Duration,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// Failure classification, for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Failure detail, for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Backoff applied before the next attempt, if one followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_before_next: Option<Duration>,
}

/// Start/end timing of a whole stage, retries included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// The stage.
    pub stage: Stage,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub finished_at: DateTime<Utc>,
    /// Elapsed time including backoff sleeps.
    pub duration: Duration,
    /// Number of attempts made.
    pub attempts: u32,
    /// Final outcome of the stage.
    pub outcome: AttemptOutcome,
}

/// The first terminal failure of a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadFailure {
    /// Stage that failed. `None` when the failure happened outside any stage
    /// (a caught panic, or cancellation before the lead was picked up).
    pub stage: Option<Stage>,
    /// Failure classification.
    pub kind: FailureKind,
    /// Human readable reason.
    pub reason: String,
}

/// A prospective contact moving through the outreach pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Source record identifier.
    pub id: String,
    /// Contact name.
    pub name: String,
    /// Contact company.
    pub company: String,
    /// Contact email address.
    pub email: String,
    status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default)]
    attempts: Vec<StageAttempt>,
    #[serde(default)]
    timings: Vec<StageTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<LeadFailure>,
}

impl Lead {
    /// Creates a new pending lead.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        company: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            company: company.into(),
            email: email.into(),
            status: LeadStatus::Pending,
            completed: None,
            message: None,
            attempts: Vec::new(),
            timings: Vec::new(),
            failure: None,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> LeadStatus {
        self.status
    }

    /// The furthest stage this lead completed successfully.
    #[must_use]
    pub fn completed_stage(&self) -> Option<Stage> {
        self.completed
    }

    /// Returns true if `stage` completed successfully for this lead.
    #[must_use]
    pub fn has_completed(&self, stage: Stage) -> bool {
        self.completed.is_some_and(|done| done >= stage)
    }

    /// The generated outreach message, once stage 2 succeeded.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Ordered attempt log.
    #[must_use]
    pub fn attempts(&self) -> &[StageAttempt] {
        &self.attempts
    }

    /// Attempts recorded for a single stage.
    pub fn attempts_for(&self, stage: Stage) -> impl Iterator<Item = &StageAttempt> {
        self.attempts.iter().filter(move |a| a.stage == stage)
    }

    /// Per-stage timings, in execution order.
    #[must_use]
    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    /// The first terminal failure, if the lead failed.
    #[must_use]
    pub fn failure(&self) -> Option<&LeadFailure> {
        self.failure.as_ref()
    }

    /// Stores the generated message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Appends attempts to the log.
    pub fn record_attempts(&mut self, attempts: impl IntoIterator<Item = StageAttempt>) {
        self.attempts.extend(attempts);
    }

    /// Appends a stage timing.
    pub fn record_timing(&mut self, timing: StageTiming) {
        self.timings.push(timing);
    }

    /// Marks `stage` as completed, advancing the status.
    pub fn complete_stage(&mut self, stage: Stage) -> Result<(), TransitionError> {
        let next = stage.success_status();
        if !self.status.can_advance_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
                stage: Some(stage),
            });
        }
        self.status = next;
        self.completed = Some(stage);
        Ok(())
    }

    /// Moves the lead to `Failed`, recording the first terminal failure.
    pub fn fail(&mut self, stage: Option<Stage>, failure: Failure) -> Result<(), TransitionError> {
        if !self.status.can_advance_to(LeadStatus::Failed) {
            return Err(TransitionError {
                from: self.status,
                to: LeadStatus::Failed,
                stage,
            });
        }
        self.status = LeadStatus::Failed;
        self.failure = Some(LeadFailure {
            stage,
            kind: failure.kind,
            reason: failure.reason,
        });
        Ok(())
    }

    /// Returns a copy of the lead's identity fields with a fresh pending state.
    #[must_use]
    pub fn identity(&self) -> Self {
        Self::new(
            self.id.clone(),
            self.name.clone(),
            self.company.clone(),
            self.email.clone(),
        )
    }
}
