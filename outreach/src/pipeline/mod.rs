//! Per-lead processing.
//!
//! This module provides:
//! - Retry policies and the retry executor for external calls
//! - Lead data validation
//! - The lead pipeline state machine

mod integration_tests;
mod lead;
mod retry;
mod validation;

pub use lead::{
    AuthBreaker, LeadPipeline, OutreachContent, PipelineResources, TaskSettings, DEFAULT_OFFER,
};
pub use retry::{
    should_retry, AttemptReport, CallSite, Execution, PolicyCategory, RetryDecision,
    RetryExecutor, RetryPolicies, RetryPolicy, RetryStats,
};
pub use validation::{is_valid_email, validate_lead};
