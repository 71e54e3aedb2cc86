//! Lead data checks for the Validate stage.

use crate::core::{Lead, StageResult};
use crate::errors::FailureKind;
use regex::Regex;
use std::sync::LazyLock;

/// local-part `@` two or more non-empty dot-separated domain labels, no
/// whitespace anywhere.
static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").ok());

/// Returns true if `email` is syntactically acceptable.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    match EMAIL.as_ref() {
        Some(re) => re.is_match(email) && !email.starts_with('.'),
        None => false,
    }
}

/// Checks a lead's contact fields.
///
/// Invalid data never becomes valid on retry, so every failure is permanent.
pub fn validate_lead(lead: &Lead) -> StageResult<()> {
    if lead.name.trim().is_empty() {
        return StageResult::permanent(FailureKind::Validation, "missing name");
    }
    if lead.company.trim().is_empty() {
        return StageResult::permanent(FailureKind::Validation, "missing company");
    }
    if !is_valid_email(&lead.email) {
        return StageResult::permanent(
            FailureKind::Validation,
            format!("invalid email address '{}'", lead.email),
        );
    }
    StageResult::Success(())
}
