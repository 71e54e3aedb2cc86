//! Capability interfaces the campaign engine consumes.
//!
//! Each trait covers one external service. Implementations own the mapping
//! from transport detail (status codes, network errors) to a
//! [`StageResult`] tag; the engine never looks past that tag.

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "smtp")]
pub mod smtp;

use crate::core::{Lead, StageResult};
use crate::errors::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The organisation the campaign is sent on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Sender organisation name.
    pub name: String,
}

impl ClientInfo {
    /// Creates client info.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new("SuperGrowth Agency")
    }
}

/// Follow-up task priority, using the tracker's 1 (urgent) to 4 (low) scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Level 1.
    Urgent,
    /// Level 2.
    High,
    /// Level 3.
    Normal,
    /// Level 4.
    Low,
}

impl TaskPriority {
    /// Parses a numeric level.
    #[must_use]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Urgent),
            2 => Some(Self::High),
            3 => Some(Self::Normal),
            4 => Some(Self::Low),
            _ => None,
        }
    }

    /// Returns the numeric level.
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Low => 4,
        }
    }
}

/// Reference to a task created in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    /// Tracker-assigned identifier.
    pub id: String,
    /// Link to the task, if the tracker returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Subject line of the outreach email.
#[must_use]
pub fn email_subject(company: &str) -> String {
    format!("Let's help {company} grow!")
}

/// Name of the follow-up task for a lead.
#[must_use]
pub fn task_name(lead: &Lead) -> String {
    format!("Follow up with {} at {}", lead.name, lead.company)
}

/// Supplies the campaign's lead set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeadSource: Send + Sync {
    /// Returns every lead. Pagination, if any, is handled internally.
    async fn list_leads(&self) -> Result<Vec<Lead>, SourceError>;

    /// Returns true if the source is reachable with the configured credentials.
    async fn test_connection(&self) -> bool {
        true
    }
}

/// Writes the personalised outreach message.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    /// Generates message text for `lead`.
    ///
    /// Rate limits are retryable; auth and validation rejections are permanent.
    async fn generate(&self, lead: &Lead, client: &ClientInfo, offer: &str) -> StageResult<String>;

    /// Returns true if the generator is reachable.
    async fn test_connection(&self) -> bool {
        true
    }
}

/// Delivers email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends one message.
    ///
    /// Transient transport errors are retryable; rejected recipients or
    /// credentials are permanent.
    async fn send(&self, to: &str, subject: &str, body: &str) -> StageResult<()>;

    /// Returns true if the transport is reachable.
    async fn test_connection(&self) -> bool {
        true
    }
}

/// Files follow-up tasks.
#[async_trait]
pub trait TaskCreator: Send + Sync {
    /// Creates a follow-up task for `lead`.
    ///
    /// The task name comes from [`task_name`]; the description is the lead's
    /// generated message.
    async fn create_task(
        &self,
        lead: &Lead,
        priority: Option<TaskPriority>,
        due_date: Option<DateTime<Utc>>,
    ) -> StageResult<TaskRef>;

    /// Returns true if the tracker is reachable.
    async fn test_connection(&self) -> bool {
        true
    }
}

/// The four adapters a campaign runs against.
#[derive(Clone)]
pub struct Adapters {
    /// Lead source.
    pub source: Arc<dyn LeadSource>,
    /// Message generator.
    pub generator: Arc<dyn MessageGenerator>,
    /// Email transport.
    pub email: Arc<dyn EmailSender>,
    /// Task tracker.
    pub tasks: Arc<dyn TaskCreator>,
}

impl Adapters {
    /// Bundles the adapters.
    #[must_use]
    pub fn new(
        source: Arc<dyn LeadSource>,
        generator: Arc<dyn MessageGenerator>,
        email: Arc<dyn EmailSender>,
        tasks: Arc<dyn TaskCreator>,
    ) -> Self {
        Self {
            source,
            generator,
            email,
            tasks,
        }
    }
}

impl fmt::Debug for Adapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapters").finish_non_exhaustive()
    }
}
