//! Pipeline stage and lead status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the per-lead pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Check the lead has the fields the later stages need.
    Validate,
    /// Ask the message generator for a personalized message.
    GenerateMessage,
    /// Deliver the message by email.
    SendEmail,
    /// File a follow-up task.
    CreateTask,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [
        Self::Validate,
        Self::GenerateMessage,
        Self::SendEmail,
        Self::CreateTask,
    ];

    /// The lead status reached when this stage succeeds.
    #[must_use]
    pub fn success_status(&self) -> LeadStatus {
        match self {
            Self::Validate => LeadStatus::Validated,
            Self::GenerateMessage => LeadStatus::MessageGenerated,
            Self::SendEmail => LeadStatus::EmailSent,
            Self::CreateTask => LeadStatus::TaskCreated,
        }
    }

    /// The stage that runs after this one, if any.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Validate => Some(Self::GenerateMessage),
            Self::GenerateMessage => Some(Self::SendEmail),
            Self::SendEmail => Some(Self::CreateTask),
            Self::CreateTask => None,
        }
    }

    /// Returns the stage name used in logs and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::GenerateMessage => "generate_message",
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The processing status of a lead.
///
/// Statuses only move forward along the stage sequence, or to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Not processed yet.
    #[default]
    Pending,
    /// Passed validation.
    Validated,
    /// A message was generated.
    MessageGenerated,
    /// The email was delivered to the transport.
    EmailSent,
    /// The follow-up task exists. Terminal success.
    TaskCreated,
    /// Processing stopped on a terminal failure.
    Failed,
}

impl LeadStatus {
    /// Position along the success path. `Failed` has no position.
    #[must_use]
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Validated => Some(1),
            Self::MessageGenerated => Some(2),
            Self::EmailSent => Some(3),
            Self::TaskCreated => Some(4),
            Self::Failed => None,
        }
    }

    /// Returns true if no further stage processing happens from this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskCreated | Self::Failed)
    }

    /// Returns true if the status indicates full success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::TaskCreated)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_advance_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(target)) => target == current + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Validated => write!(f, "validated"),
            Self::MessageGenerated => write!(f, "message_generated"),
            Self::EmailSent => write!(f, "email_sent"),
            Self::TaskCreated => write!(f, "task_created"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
