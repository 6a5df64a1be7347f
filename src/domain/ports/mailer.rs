//! Outgoing email port.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// File attached to a report email.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

/// A single-recipient message.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<EmailAttachment>,
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("could not build message: {0}")]
    Message(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no SMTP host configured")]
    NotConfigured,
}

impl MailerError {
    /// Errors that another attempt cannot fix.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Mailer name for logs (e.g., "smtp", "log").
    fn name(&self) -> &'static str;

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailerError>;
}
