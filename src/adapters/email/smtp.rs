//! SMTP mailer backed by lettre's async transport.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::domain::models::SmtpConfig;
use crate::domain::ports::mailer::{Mailer, MailerError, OutgoingEmail};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, host: &str) -> Result<Self, MailerError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|_| MailerError::InvalidAddress(config.from_address.clone()))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailerError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        let mut builder = builder.port(config.port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::info!(host, port = config.port, starttls = config.starttls, "SMTP mailer configured");

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailerError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailerError::InvalidAddress(email.to.clone()))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone());
        let body = SinglePart::plain(email.body.clone());

        let message = match &email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.mime_type)
                    .map_err(|e| MailerError::Message(e.to_string()))?;
                let file = Attachment::new(attachment.filename.clone())
                    .body(attachment.bytes.as_ref().clone(), content_type);
                builder.multipart(MultiPart::mixed().singlepart(body).singlepart(file))
            }
            None => builder.singlepart(body),
        };

        message.map_err(|e| MailerError::Message(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailerError> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| MailerError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mailer::EmailAttachment;
    use std::sync::Arc;

    fn mailer() -> SmtpMailer {
        let config = SmtpConfig {
            host: Some("localhost".to_string()),
            starttls: false,
            ..SmtpConfig::default()
        };
        SmtpMailer::new(&config, "localhost").unwrap()
    }

    #[tokio::test]
    async fn test_builds_message_with_attachment() {
        let email = OutgoingEmail {
            to: "ops@ex.com".to_string(),
            subject: "Daily Production".to_string(),
            body: "Attached.".to_string(),
            attachment: Some(EmailAttachment {
                filename: "daily_production_20250102_0600.zip".to_string(),
                mime_type: "application/zip".to_string(),
                bytes: Arc::new(vec![1, 2, 3]),
            }),
        };
        let message = mailer().build_message(&email).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("daily_production_20250102_0600.zip"));
        assert!(raw.contains("multipart/mixed"));
    }

    #[tokio::test]
    async fn test_rejects_bad_recipient() {
        let email = OutgoingEmail {
            to: "not an address".to_string(),
            subject: "x".to_string(),
            body: String::new(),
            attachment: None,
        };
        assert!(matches!(mailer().build_message(&email), Err(MailerError::InvalidAddress(_))));
    }
}
