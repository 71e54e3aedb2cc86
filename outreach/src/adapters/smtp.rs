//! Email delivery over SMTP.

use crate::adapters::EmailSender;
use crate::core::{Failure, StageResult};
use crate::errors::{ConfigError, FailureKind};
use async_trait::async_trait;
use lettre::address::Address;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::{Code, Severity};
use lettre::transport::smtp::Error as SmtpError;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

/// Submission port used when none is configured.
pub const DEFAULT_SMTP_PORT: u16 = 587;

const IMPLICIT_TLS_PORT: u16 = 465;

/// Connection settings for an SMTP relay.
#[derive(Clone)]
pub struct SmtpSettings {
    /// Relay host name.
    pub server: String,
    /// Relay port; 465 uses implicit TLS, anything else STARTTLS.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Sender address.
    pub from_email: String,
    /// Display name shown next to the sender address.
    pub from_name: Option<String>,
    /// Bound on connecting and on each SMTP command.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from_email", &self.from_email)
            .finish_non_exhaustive()
    }
}

/// Sends plain-text outreach email through an authenticated relay.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    server: String,
}

impl SmtpEmailSender {
    /// Builds the transport. Nothing is sent until the first message.
    pub fn new(settings: SmtpSettings) -> Result<Self, ConfigError> {
        let from = sender_mailbox(&settings.from_email, settings.from_name.clone())?;
        let builder = if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
        }
        .map_err(|e| ConfigError::invalid("smtp_server", e.to_string()))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(settings.username, settings.password))
            .timeout(settings.timeout)
            .build();

        Ok(Self {
            transport,
            from,
            server: settings.server,
        })
    }

    fn message(&self, to: &str, subject: &str, body: &str) -> Result<Message, Failure> {
        let to: Mailbox = to.parse().map_err(|e| {
            Failure::new(FailureKind::Validation, format!("invalid recipient address '{to}': {e}"))
        })?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Failure::new(FailureKind::Validation, e.to_string()))
    }
}

impl std::fmt::Debug for SmtpEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpEmailSender")
            .field("server", &self.server)
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

fn sender_mailbox(from_email: &str, name: Option<String>) -> Result<Mailbox, ConfigError> {
    let address: Address = from_email
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid("from_email", format!("{e}")))?;
    Ok(Mailbox::new(name, address))
}

/// Maps an SMTP reply code to a tagged failure.
///
/// 4xx replies are transient. 5xx replies are permanent, with the
/// authentication codes reported as `Auth`.
pub fn classify_reply<T>(code: Code, reason: impl Into<String>) -> StageResult<T> {
    match code.severity {
        Severity::TransientNegativeCompletion => StageResult::retryable(FailureKind::Transport, reason),
        Severity::PermanentNegativeCompletion => match code.to_string().as_str() {
            "530" | "534" | "535" => StageResult::permanent(FailureKind::Auth, reason),
            _ => StageResult::permanent(FailureKind::Validation, reason),
        },
        _ => StageResult::permanent(FailureKind::Internal, reason),
    }
}

/// Maps a transport error to a tagged failure.
pub fn classify_error<T>(err: &SmtpError) -> StageResult<T> {
    let reason = err.to_string();
    if let Some(code) = err.status() {
        return classify_reply(code, reason);
    }
    if err.is_transient() || err.is_timeout() {
        return StageResult::retryable(FailureKind::Transport, reason);
    }
    if err.is_permanent() {
        return StageResult::permanent(FailureKind::Validation, reason);
    }
    if err.is_tls() {
        return StageResult::permanent(FailureKind::Transport, reason);
    }
    // Connection refused or reset, broken pipe.
    StageResult::retryable(FailureKind::Transport, reason)
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> StageResult<()> {
        let message = match self.message(to, subject, body) {
            Ok(message) => message,
            Err(failure) => return StageResult::PermanentFailure(failure),
        };
        debug!(to, server = %self.server, "Sending outreach email");
        match self.transport.send(message).await {
            Ok(_) => StageResult::Success(()),
            Err(e) => classify_error(&e),
        }
    }

    async fn test_connection(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(connected) => connected,
            Err(e) => {
                debug!(error = %e, server = %self.server, "SMTP connection check failed");
                false
            }
        }
    }
}
