//! Campaign statistics and the final report.

mod aggregator;
mod report;

pub use aggregator::MetricsAggregator;
pub use report::{CampaignReport, CampaignTotals, FailedLead, StageStats};
