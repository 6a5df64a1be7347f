//! Mailer used when no SMTP relay is configured.

use async_trait::async_trait;

use crate::domain::ports::mailer::{Mailer, MailerError, OutgoingEmail};

/// Logs each message instead of sending it. Every send fails with
/// [`MailerError::NotConfigured`] so no recipient is recorded as delivered.
#[derive(Debug, Clone, Default)]
pub struct LoggingMailer;

impl LoggingMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LoggingMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailerError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            attachment = email.attachment.as_ref().map(|a| a.filename.as_str()),
            bytes = email.attachment.as_ref().map_or(0, |a| a.bytes.len()),
            "Report email not sent: no SMTP host configured"
        );
        Err(MailerError::NotConfigured)
    }
}
