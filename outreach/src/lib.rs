//! # Outreach
//!
//! A campaign engine that takes a set of leads through a fixed outreach
//! pipeline: validate the contact, generate a personalised message, send it,
//! and file a follow-up task.
//!
//! The engine provides:
//!
//! - **Per-stage retry**: exponential backoff with jitter, configured per adapter category
//! - **Failure isolation**: one lead failing (or panicking) never stops the others
//! - **Bounded concurrency**: a fixed worker pool pulls leads from a shared queue
//! - **Cancellation**: deadlines and external aborts settle every lead into a terminal status
//! - **Campaign metrics**: stage counts, timings and failed-lead reasons in one report
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use outreach::prelude::*;
//!
//! let adapters = Adapters::new(source, generator, email, tasks);
//! let outcome = CampaignOrchestrator::new(adapters, CampaignOptions::default())
//!     .run()
//!     .await?;
//! println!("{}", outcome.report);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod campaign;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::{
        Adapters, ClientInfo, EmailSender, LeadSource, MessageGenerator, TaskCreator,
        TaskPriority, TaskRef,
    };
    pub use crate::campaign::{
        run_campaign, CampaignOptions, CampaignOrchestrator, CampaignOutcome,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{
        AttemptOutcome, Failure, Lead, LeadStatus, Stage, StageAttempt, StageResult,
    };
    pub use crate::errors::{ConfigError, FailureKind, OutreachError, SourceError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::metrics::{CampaignReport, CampaignTotals, MetricsAggregator};
    pub use crate::pipeline::{
        LeadPipeline, PipelineResources, RetryExecutor, RetryPolicies, RetryPolicy,
    };
}
