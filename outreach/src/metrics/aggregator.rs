//! Running campaign statistics.

use super::report::{CampaignReport, CampaignTotals, FailedLead, StageStats};
use crate::core::{AttemptOutcome, Lead, LeadStatus, Stage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
struct StageAccumulator {
    runs: u64,
    successes: u64,
    failures: u64,
    attempts: u64,
    total: Duration,
}

#[derive(Debug, Default)]
struct AggregatorState {
    totals: CampaignTotals,
    stages: BTreeMap<Stage, StageAccumulator>,
    failed: Vec<(usize, FailedLead)>,
    cancel_reason: Option<String>,
    finished: Option<(DateTime<Utc>, Duration)>,
}

/// Folds finished leads into campaign statistics.
///
/// Only sums and counts are kept per stage, so memory does not grow with
/// the number of leads (apart from the failed-lead list). `record` may be
/// called concurrently from any number of workers.
#[derive(Debug)]
pub struct MetricsAggregator {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    start: Instant,
    state: Mutex<AggregatorState>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(Uuid::now_v7())
    }
}

impl MetricsAggregator {
    /// Starts aggregating for run `run_id`.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            start: Instant::now(),
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Records one lead in a terminal status, positioned by arrival.
    ///
    /// Ignored once the aggregator is finalized.
    pub fn record(&self, lead: &Lead) {
        let position = usize::try_from(self.recorded()).unwrap_or(usize::MAX);
        self.record_at(position, lead);
    }

    /// Records one lead at `position` in the source lead set.
    ///
    /// Failed leads are reported in `position` order.
    pub fn record_at(&self, position: usize, lead: &Lead) {
        let mut state = self.state.lock();
        if state.finished.is_some() {
            warn!(lead_id = %lead.id, "Lead recorded after campaign finalized, ignoring");
            return;
        }

        let totals = &mut state.totals;
        totals.leads += 1;
        if lead.has_completed(Stage::Validate) {
            totals.validated += 1;
        }
        if lead.has_completed(Stage::GenerateMessage) {
            totals.messages_generated += 1;
        }
        if lead.has_completed(Stage::SendEmail) {
            totals.emails_sent += 1;
        }
        if lead.has_completed(Stage::CreateTask) {
            totals.tasks_created += 1;
        }

        for timing in lead.timings() {
            let acc = state.stages.entry(timing.stage).or_default();
            acc.runs += 1;
            acc.attempts += u64::from(timing.attempts);
            acc.total += timing.duration;
            if timing.outcome == AttemptOutcome::Success {
                acc.successes += 1;
            } else {
                acc.failures += 1;
            }
        }

        if lead.status() == LeadStatus::Failed {
            state.totals.failed += 1;
            if let Some(failure) = lead.failure() {
                state.failed.push((position, FailedLead {
                    lead_id: lead.id.clone(),
                    name: lead.name.clone(),
                    email: lead.email.clone(),
                    stage: failure.stage,
                    kind: failure.kind,
                    reason: failure.reason.clone(),
                }));
            }
        }
    }

    /// Marks the run as cancelled.
    pub fn mark_cancelled(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.cancel_reason.is_none() {
            state.cancel_reason = Some(reason.into());
        }
    }

    /// Number of leads recorded so far.
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.state.lock().totals.leads
    }

    /// Returns the report as of now, without finalizing.
    #[must_use]
    pub fn snapshot(&self) -> CampaignReport {
        let state = self.state.lock();
        let (finished_at, elapsed) = state
            .finished
            .unwrap_or_else(|| (Utc::now(), self.start.elapsed()));
        self.build(&state, finished_at, elapsed)
    }

    /// Freezes the statistics and returns the final report.
    ///
    /// Later `record` calls are ignored; repeated calls return the same report.
    pub fn finalize(&self) -> CampaignReport {
        let mut state = self.state.lock();
        let (finished_at, elapsed) = *state
            .finished
            .get_or_insert_with(|| (Utc::now(), self.start.elapsed()));
        self.build(&state, finished_at, elapsed)
    }

    fn build(&self, state: &AggregatorState, finished_at: DateTime<Utc>, elapsed: Duration) -> CampaignReport {
        let stages = state
            .stages
            .iter()
            .map(|(stage, acc)| {
                let total_ms = acc.total.as_secs_f64() * 1000.0;
                #[allow(clippy::cast_precision_loss)]
                let average_ms = if acc.runs == 0 {
                    0.0
                } else {
                    total_ms / acc.runs as f64
                };
                StageStats {
                    stage: *stage,
                    runs: acc.runs,
                    successes: acc.successes,
                    failures: acc.failures,
                    attempts: acc.attempts,
                    total_ms,
                    average_ms,
                }
            })
            .collect();

        let mut failed = state.failed.clone();
        failed.sort_by_key(|(position, _)| *position);
        let failed_leads = failed.into_iter().map(|(_, lead)| lead).collect();

        CampaignReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            totals: state.totals,
            stages,
            failed_leads,
            cancelled: state.cancel_reason.is_some(),
            cancel_reason: state.cancel_reason.clone(),
        }
    }
}
