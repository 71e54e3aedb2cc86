//! Testing utilities for campaign runs.
//!
//! This module provides:
//! - Scripted adapters with per-lead canned results
//! - Lead fixtures and a bundled mock adapter set

mod fixtures;
mod mocks;

pub use fixtures::{lead, valid_leads, MockAdapters};
pub use mocks::{
    CreatedTask, Script, ScriptedEmailSender, ScriptedGenerator, ScriptedTaskCreator, SentEmail,
    StaticLeadSource,
};
