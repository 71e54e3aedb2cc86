//! Structured campaign events.
//!
//! Components emit through an [`EventSink`] they were constructed with. The
//! event names below are the full vocabulary used by the engine.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// One external-call attempt finished (any outcome).
pub const STAGE_ATTEMPT: &str = "stage.attempt";
/// A stage finished successfully.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage finished with a terminal failure.
pub const STAGE_FAILED: &str = "stage.failed";
/// A lead reached a terminal status.
pub const LEAD_COMPLETED: &str = "lead.completed";
/// The campaign fetched its lead set and started the worker pool.
pub const CAMPAIGN_STARTED: &str = "campaign.started";
/// The campaign finished and the report is final.
pub const CAMPAIGN_COMPLETED: &str = "campaign.completed";
