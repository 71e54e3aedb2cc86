//! The campaign report.

use crate::core::Stage;
use crate::errors::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lead counts by the furthest stage reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignTotals {
    /// Leads recorded.
    pub leads: u64,
    /// Leads that passed validation.
    pub validated: u64,
    /// Leads with a generated message.
    pub messages_generated: u64,
    /// Leads whose email was sent.
    pub emails_sent: u64,
    /// Leads with a follow-up task.
    pub tasks_created: u64,
    /// Leads that ended in `Failed`.
    pub failed: u64,
}

impl CampaignTotals {
    /// Fraction of leads that reached the final stage.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.leads == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.tasks_created as f64 / self.leads as f64;
        rate
    }
}

/// Aggregate timing and outcome counts for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    /// The stage.
    pub stage: Stage,
    /// Number of times the stage ran.
    pub runs: u64,
    /// Runs that succeeded.
    pub successes: u64,
    /// Runs that ended in a terminal failure.
    pub failures: u64,
    /// Attempts across all runs, retries included.
    pub attempts: u64,
    /// Summed stage duration, in milliseconds.
    pub total_ms: f64,
    /// Mean stage duration, in milliseconds.
    pub average_ms: f64,
}

/// A lead that ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedLead {
    /// Lead identifier.
    pub lead_id: String,
    /// Contact name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Stage that failed, if any.
    pub stage: Option<Stage>,
    /// Failure classification.
    pub kind: FailureKind,
    /// First terminal-failure reason.
    pub reason: String,
}

/// Final (or in-progress) statistics for a campaign run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the report was produced.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock run time, in milliseconds.
    pub duration_ms: f64,
    /// Lead counts.
    pub totals: CampaignTotals,
    /// Per-stage statistics, in pipeline order.
    pub stages: Vec<StageStats>,
    /// Failed leads with their reasons.
    pub failed_leads: Vec<FailedLead>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Cancellation reason, if cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl CampaignReport {
    /// Statistics for one stage.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    fn average_secs(&self, stage: Stage) -> f64 {
        self.stage(stage).map_or(0.0, |s| s.average_ms / 1000.0)
    }
}

impl fmt::Display for CampaignReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.totals;
        writeln!(f, "Campaign Summary:")?;
        writeln!(f, "Total Leads: {}", t.leads)?;
        writeln!(f, "Validated: {}", t.validated)?;
        writeln!(f, "Messages Generated: {}", t.messages_generated)?;
        writeln!(f, "Emails Sent: {}", t.emails_sent)?;
        writeln!(f, "Tasks Created: {}", t.tasks_created)?;
        writeln!(f, "Failed: {}", t.failed)?;
        if let Some(reason) = &self.cancel_reason {
            writeln!(f, "Cancelled: {reason}")?;
        }

        writeln!(f)?;
        writeln!(f, "Performance Metrics:")?;
        writeln!(f, "Total Processing Time: {:.2}s", self.duration_ms / 1000.0)?;
        writeln!(
            f,
            "Average Message Generation: {:.2}s",
            self.average_secs(Stage::GenerateMessage)
        )?;
        writeln!(f, "Average Email Sending: {:.2}s", self.average_secs(Stage::SendEmail))?;
        writeln!(f, "Average Task Creation: {:.2}s", self.average_secs(Stage::CreateTask))?;

        if !self.failed_leads.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed Leads:")?;
            for lead in &self.failed_leads {
                let stage = lead.stage.map_or("-", |s| s.as_str());
                writeln!(
                    f,
                    "- {} <{}> at {}: {} ({})",
                    lead.name, lead.email, stage, lead.reason, lead.kind
                )?;
            }
        }
        Ok(())
    }
}
