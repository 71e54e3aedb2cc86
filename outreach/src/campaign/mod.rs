//! Campaign runs over a bounded worker pool.

mod orchestrator;
mod scenario_tests;

pub use orchestrator::{
    run_campaign, CampaignOptions, CampaignOrchestrator, CampaignOutcome, ConnectionCheck,
    DEFAULT_CALL_TIMEOUT, DEFAULT_CONCURRENCY, INTERNAL_ERROR,
};
