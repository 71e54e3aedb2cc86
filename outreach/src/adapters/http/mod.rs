//! HTTP adapters for the hosted services a production campaign talks to.
//!
//! Every adapter shares the classification below, so a status code means the
//! same thing whichever service returned it.

mod airtable;
mod anthropic;
mod clickup;

pub use airtable::AirtableLeadSource;
pub use anthropic::AnthropicMessageGenerator;
pub use clickup::ClickUpTaskCreator;

use crate::core::StageResult;
use crate::errors::{FailureKind, OutreachError};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("outreach/", env!("CARGO_PKG_VERSION"));
const MAX_BODY_IN_REASON: usize = 200;

/// Builds the client shared by all HTTP adapters.
///
/// `timeout` bounds each request at the transport level; the retry executor
/// applies its own per-call timeout on top.
pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, OutreachError> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| OutreachError::Setup(format!("failed to build HTTP client: {e}")))
}

/// Maps a non-success HTTP status to a tagged failure.
pub fn classify_status<T>(status: StatusCode, body: &str) -> StageResult<T> {
    let reason = failure_reason(status, body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => StageResult::retryable(FailureKind::RateLimit, reason),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StageResult::permanent(FailureKind::Auth, reason)
        }
        StatusCode::REQUEST_TIMEOUT => StageResult::retryable(FailureKind::Transport, reason),
        s if s.is_server_error() => StageResult::retryable(FailureKind::Transport, reason),
        s if s.is_client_error() => StageResult::permanent(FailureKind::Validation, reason),
        _ => StageResult::permanent(FailureKind::Internal, reason),
    }
}

/// Maps a transport error to a tagged failure.
pub fn classify_error<T>(err: &reqwest::Error) -> StageResult<T> {
    if let Some(status) = err.status() {
        return classify_status(status, &err.to_string());
    }
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return StageResult::retryable(FailureKind::Transport, err.to_string());
    }
    if err.is_decode() {
        return StageResult::permanent(FailureKind::Internal, format!("malformed response: {err}"));
    }
    StageResult::retryable(FailureKind::Transport, err.to_string())
}

fn failure_reason(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status.to_string();
    }
    let mut excerpt: String = body.chars().take(MAX_BODY_IN_REASON).collect();
    if excerpt.len() < body.len() {
        excerpt.push_str("...");
    }
    format!("{status}: {excerpt}")
}

/// Sends `request` and decodes a JSON success body.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> StageResult<T> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return classify_error(&e),
    };
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return classify_error(&e),
    };
    if !status.is_success() {
        debug!(%status, "HTTP call rejected");
        return classify_status(status, &body);
    }
    match serde_json::from_str(&body) {
        Ok(value) => StageResult::Success(value),
        Err(e) => StageResult::permanent(FailureKind::Internal, format!("malformed response: {e}")),
    }
}

/// Sends `request` and reports whether it came back with a success status.
pub(crate) async fn check_reachable(request: RequestBuilder) -> bool {
    match request.send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!(error = %e, "Connection check failed");
            false
        }
    }
}
