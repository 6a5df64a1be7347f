//! Outgoing email adapters.

pub mod logging;
pub mod smtp;

use std::sync::Arc;

pub use logging::LoggingMailer;
pub use smtp::SmtpMailer;

use crate::domain::models::SmtpConfig;
use crate::domain::ports::{Mailer, MailerError};

/// SMTP when a relay host is configured, otherwise a mailer that only logs.
pub fn mailer_from_config(config: &SmtpConfig) -> Result<Arc<dyn Mailer>, MailerError> {
    match config.host.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(host) => Ok(Arc::new(SmtpMailer::new(config, host)?)),
        None => {
            tracing::warn!("No SMTP host configured; report emails will be logged and recorded as undelivered");
            Ok(Arc::new(LoggingMailer::new()))
        }
    }
}
