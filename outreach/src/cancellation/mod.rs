//! Campaign-wide cooperative cancellation.

mod token;

pub use token::{CancelCallback, CancellationToken};

/// Reason recorded on leads interrupted by campaign cancellation.
pub const CAMPAIGN_CANCELLED: &str = "campaign cancelled";
