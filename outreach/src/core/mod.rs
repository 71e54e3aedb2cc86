//! Core types: leads, stages, statuses, and stage results.

mod lead;
mod result;
mod status;

pub use lead::{Lead, LeadFailure, StageAttempt, StageTiming};
pub use result::{AttemptOutcome, Failure, StageResult};
pub use status::{LeadStatus, Stage};
