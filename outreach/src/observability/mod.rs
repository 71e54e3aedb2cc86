//! Log subscriber setup for the CLI.

use crate::errors::OutreachError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "outreach=info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Builds the filter from `RUST_LOG`, falling back to `default_directive`.
///
/// `verbose` raises the crate to `debug`, which includes per-attempt retry detail.
#[must_use]
pub fn env_filter(default_directive: &str, verbose: bool) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    if verbose {
        match "outreach=debug".parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    } else {
        filter
    }
}

/// Default log file name used by the CLI.
pub const DEFAULT_LOG_FILE: &str = "outreach_agent.log";

/// Builds the writer: stdout, plus `log_file` (appended) when given.
pub fn log_writer(log_file: Option<&Path>) -> Result<BoxMakeWriter, OutreachError> {
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(BoxMakeWriter::new(std::io::stdout.and(Arc::new(file))))
        }
        None => Ok(BoxMakeWriter::new(std::io::stdout)),
    }
}

/// Installs the global subscriber.
///
/// With `log_file`, every line also goes to that file, without ANSI colours.
pub fn init_tracing(format: LogFormat, verbose: bool, log_file: Option<&Path>) -> Result<(), OutreachError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_DIRECTIVE, verbose))
        .with_writer(log_writer(log_file)?)
        .with_ansi(log_file.is_none());
    let result = match format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| OutreachError::Setup(format!("failed to install log subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn test_log_writer_appends_to_file() {
        use std::io::Write;
        use tracing_subscriber::fmt::MakeWriter;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_LOG_FILE);
        std::fs::write(&path, "earlier\n").unwrap();

        let writer = log_writer(Some(&path)).unwrap();
        writer.make_writer().write_all(b"campaign started\n").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "earlier\ncampaign started\n");
        assert!(log_writer(None).is_ok());
    }

    #[test]
    fn test_log_writer_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = log_writer(Some(&dir.path().join("missing").join("x.log"))).unwrap_err();
        assert!(matches!(err, OutreachError::Io(_)));
    }

    #[test]
    fn test_env_filter_verbose_adds_debug() {
        let filter = env_filter("outreach=warn", true);
        assert!(filter.to_string().contains("outreach=debug"));
    }
}
