//! Error types for the outreach engine.
//!
//! Stage-level problems never surface through these types: they are folded
//! into a [`StageResult`](crate::core::StageResult) and end up in the lead's
//! attempt log. The errors here cover campaign setup and programming faults.

use crate::core::{LeadStatus, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for outreach operations.
#[derive(Debug, Error)]
pub enum OutreachError {
    /// The campaign could not start (no adapter reachable, no leads listable).
    #[error("Campaign setup failed: {0}")]
    Setup(String),

    /// The lead source failed to produce the lead set.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// Configuration was rejected.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A retry policy failed validation.
    #[error("{0}")]
    Policy(#[from] PolicyError),

    /// A lead status transition broke the forward-only rule.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// The campaign was cancelled before it could start.
    #[error("Campaign cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a failed external call or pipeline step.
///
/// Whether a failure is retried is decided by the [`StageResult`] tag the
/// adapter returns, not by the kind; the kind is carried for reporting.
///
/// [`StageResult`]: crate::core::StageResult
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Lead data or request shape is invalid.
    Validation,
    /// The remote service throttled the call.
    RateLimit,
    /// Credentials were rejected.
    Auth,
    /// Network trouble, timeouts, or 5xx responses.
    Transport,
    /// An unexpected fault inside the pipeline.
    Internal,
    /// The campaign was cancelled while the lead was in flight.
    Cancelled,
}

impl FailureKind {
    /// Returns true for kinds that are normally worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Transport)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Auth => write!(f, "auth"),
            Self::Transport => write!(f, "transport"),
            Self::Internal => write!(f, "internal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error raised by a [`LeadSource`](crate::adapters::LeadSource) listing call.
#[derive(Debug, Clone, Error)]
#[error("Lead source error ({kind}): {message}")]
pub struct SourceError {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human readable detail.
    pub message: String,
}

impl SourceError {
    /// Creates a new source error.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transport source error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    /// Creates an authentication source error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }
}

/// Errors raised while loading campaign configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// A value is present but unusable.
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The retry policy file could not be parsed.
    #[error("Failed to parse retry policies: {0}")]
    Parse(#[from] serde_json::Error),

    /// The retry policy file could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a retry policy is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid retry policy '{policy}': {reason}")]
pub struct PolicyError {
    /// The policy category name.
    pub policy: String,
    /// Why it was rejected.
    pub reason: String,
}

impl PolicyError {
    /// Creates a new policy error.
    #[must_use]
    pub fn new(policy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a lead status would move backwards or out of a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid lead transition {from} -> {to}{}", .stage.map(|s| format!(" at stage {s}")).unwrap_or_default())]
pub struct TransitionError {
    /// Current status.
    pub from: LeadStatus,
    /// Requested status.
    pub to: LeadStatus,
    /// Stage that requested the move, if any.
    pub stage: Option<Stage>,
}
