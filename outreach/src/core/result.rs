//! Tagged outcome of a single external call.

use crate::errors::FailureKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an external call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Classification from the error taxonomy.
    pub kind: FailureKind,
    /// Human readable detail.
    pub reason: String,
}

impl Failure {
    /// Creates a new failure.
    #[must_use]
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

/// The outcome of one adapter invocation.
///
/// Adapters own the mapping from transport detail to this tag; the retry
/// executor and pipeline trust it as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult<T> {
    /// The call succeeded with a payload.
    Success(T),
    /// The call failed but may succeed if repeated.
    RetryableFailure(Failure),
    /// The call failed and repeating it will not help.
    PermanentFailure(Failure),
}

impl<T> StageResult<T> {
    /// Creates a retryable failure.
    #[must_use]
    pub fn retryable(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::RetryableFailure(Failure::new(kind, reason))
    }

    /// Creates a permanent failure.
    #[must_use]
    pub fn permanent(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::PermanentFailure(Failure::new(kind, reason))
    }

    /// Returns true if the call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if the failure may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableFailure(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::RetryableFailure(f) | Self::PermanentFailure(f) => Some(f),
        }
    }

    /// Returns the outcome tag without the payload.
    #[must_use]
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Success(_) => AttemptOutcome::Success,
            Self::RetryableFailure(_) => AttemptOutcome::RetryableFailure,
            Self::PermanentFailure(_) => AttemptOutcome::PermanentFailure,
        }
    }

    /// Maps the success payload.
    pub fn map<U, F>(self, f: F) -> StageResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => StageResult::Success(f(value)),
            Self::RetryableFailure(failure) => StageResult::RetryableFailure(failure),
            Self::PermanentFailure(failure) => StageResult::PermanentFailure(failure),
        }
    }

    /// Converts to a `Result`, folding both failure tags into `Err`.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::RetryableFailure(failure) | Self::PermanentFailure(failure) => Err(failure),
        }
    }
}

/// Payload-free outcome tag, as recorded in the attempt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The attempt succeeded.
    Success,
    /// The attempt failed and was eligible for retry.
    RetryableFailure,
    /// The attempt failed permanently.
    PermanentFailure,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::RetryableFailure => write!(f, "retryable_failure"),
            Self::PermanentFailure => write!(f, "permanent_failure"),
        }
    }
}
