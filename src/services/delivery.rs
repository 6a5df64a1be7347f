//! Report delivery over email.
//!
//! Each recipient is attempted independently with exponential backoff. A
//! recipient that never accepts the message is recorded as failed; delivery
//! never fails the run. Permanent mailer errors (a bad address, no relay
//! configured) end the attempts for that recipient at once.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::domain::models::{DeliveryResult, DeliveryStatus, RenderedArtifact, ReportData, ReportSchedule};
use crate::domain::ports::mailer::{EmailAttachment, Mailer, OutgoingEmail};

/// Growth factor of the delay between attempts.
const BACKOFF_FACTOR: u32 = 4;

pub struct DeliveryService {
    mailer: Arc<dyn Mailer>,
    retries: u32,
    backoff_base: Duration,
}

impl DeliveryService {
    pub fn new(mailer: Arc<dyn Mailer>, retries: u32, backoff_base: Duration) -> Self {
        Self {
            mailer,
            retries,
            backoff_base,
        }
    }

    /// Delay before retry number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base
            .saturating_mul(BACKOFF_FACTOR.saturating_pow(retry.saturating_sub(1)))
    }

    /// Send the artifact to every recipient of `schedule`.
    ///
    /// Results come back in recipient order. No recipients means an empty result.
    pub async fn deliver(
        &self,
        schedule: &ReportSchedule,
        data: &ReportData,
        artifact: &RenderedArtifact,
    ) -> Vec<DeliveryResult> {
        if schedule.recipients.is_empty() {
            return Vec::new();
        }

        let attachment = EmailAttachment {
            filename: artifact.filename.clone(),
            mime_type: artifact.mime_type.clone(),
            bytes: Arc::new(artifact.bytes.clone()),
        };
        let subject = format!(
            "{} ({})",
            schedule.report_title,
            data.window.end.format("%Y-%m-%d %H:%M UTC")
        );
        let body = message_body(schedule, data);

        let sends = schedule.recipients.iter().map(|recipient| {
            let email = OutgoingEmail {
                to: recipient.clone(),
                subject: subject.clone(),
                body: body.clone(),
                attachment: Some(attachment.clone()),
            };
            self.deliver_one(email)
        });
        join_all(sends).await
    }

    async fn deliver_one(&self, email: OutgoingEmail) -> DeliveryResult {
        let max_attempts = self.retries.saturating_add(1);
        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < max_attempts {
            if attempts > 0 {
                tokio::time::sleep(self.backoff(attempts)).await;
            }
            attempts += 1;

            match self.mailer.send(&email).await {
                Ok(()) => {
                    tracing::info!(recipient = %email.to, attempts, mailer = self.mailer.name(), "Report delivered");
                    return DeliveryResult {
                        recipient: email.to,
                        status: DeliveryStatus::Delivered,
                        attempts,
                    };
                }
                Err(e) => {
                    tracing::warn!(recipient = %email.to, attempt = attempts, error = %e, "Delivery attempt failed");
                    last_error = e.to_string();
                    if e.is_permanent() {
                        break;
                    }
                }
            }
        }

        tracing::error!(recipient = %email.to, attempts, error = %last_error, "Giving up on recipient");
        DeliveryResult {
            recipient: email.to,
            status: DeliveryStatus::Failed { reason: last_error },
            attempts,
        }
    }
}

fn message_body(schedule: &ReportSchedule, data: &ReportData) -> String {
    let mut body = format!(
        "{} report \"{}\"\nPeriod: {} to {}\n",
        schedule.report_type.as_str(),
        schedule.report_title,
        data.window.start.format("%Y-%m-%d %H:%M UTC"),
        data.window.end.format("%Y-%m-%d %H:%M UTC"),
    );
    if let Some(failed) = data.failure_summary() {
        body.push_str(&format!("\nSome sections could not be produced: {failed}\n"));
    }
    body.push_str("\nThe report is attached.\n");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NewReportSchedule, Recipients, ReportFormat, ReportType, Frequency};
    use crate::adapters::email::LoggingMailer;
    use crate::domain::ports::mailer::MailerError;
    use crate::services::renderer::fixtures;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` sends to each address listed in `flaky`.
    struct FlakyMailer {
        flaky: Vec<String>,
        failures: u32,
        calls: Mutex<Vec<String>>,
        sent: AtomicU32,
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn send(&self, email: &OutgoingEmail) -> Result<(), MailerError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(email.to.clone());
            let seen = u32::try_from(calls.iter().filter(|c| **c == email.to).count()).unwrap();
            drop(calls);
            if self.flaky.contains(&email.to) && seen <= self.failures {
                return Err(MailerError::Transport("connection refused".to_string()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn schedule(recipients: &[&str]) -> ReportSchedule {
        ReportSchedule::new(
            NewReportSchedule {
                report_title: "Daily Production".to_string(),
                report_type: ReportType::Production,
                frequency: Frequency::Daily,
                next_run: None,
                recipients: Recipients::parse(recipients.iter().copied()).unwrap(),
                format: ReportFormat::Csv,
                site_code: None,
                created_by: None,
            },
            Utc::now(),
        )
    }

    fn service(flaky: &[&str], failures: u32, retries: u32) -> (DeliveryService, Arc<FlakyMailer>) {
        let mailer = Arc::new(FlakyMailer {
            flaky: flaky.iter().map(|s| (*s).to_string()).collect(),
            failures,
            calls: Mutex::new(Vec::new()),
            sent: AtomicU32::new(0),
        });
        (DeliveryService::new(mailer.clone(), retries, Duration::from_millis(1)), mailer)
    }

    fn artifact() -> RenderedArtifact {
        RenderedArtifact {
            bytes: b"a,b\r\n".to_vec(),
            mime_type: "text/csv".to_string(),
            filename: "daily_production_20250102_0600.csv".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_recipients_is_empty_success() {
        let (svc, mailer) = service(&[], 0, 2);
        let results = svc.deliver(&schedule(&[]), &fixtures::report(1), &artifact()).await;
        assert!(results.is_empty());
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let (svc, _) = service(&["ops@ex.com"], 2, 2);
        let results = svc.deliver(&schedule(&["ops@ex.com"]), &fixtures::report(1), &artifact()).await;
        assert!(results[0].delivered());
        assert_eq!(results[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted_recipient_is_recorded_failed_others_unaffected() {
        let (svc, mailer) = service(&["bad@ex.com"], 10, 2);
        let results = svc
            .deliver(&schedule(&["ops@ex.com", "bad@ex.com"]), &fixtures::report(1), &artifact())
            .await;

        assert_eq!(results[0].recipient, "ops@ex.com");
        assert!(results[0].delivered());
        assert_eq!(results[1].attempts, 3);
        assert!(matches!(&results[1].status, DeliveryStatus::Failed { reason } if reason.contains("refused")));
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_mailer_records_failure_without_retrying() {
        let svc = DeliveryService::new(Arc::new(LoggingMailer::new()), 2, Duration::from_millis(1));
        let results = svc.deliver(&schedule(&["ops@ex.com"]), &fixtures::report(1), &artifact()).await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].delivered());
        assert_eq!(results[0].attempts, 1);
        assert!(matches!(&results[0].status, DeliveryStatus::Failed { reason } if reason.contains("no SMTP host")));
    }

    #[test]
    fn test_backoff_grows_by_four() {
        let (mut svc, _) = service(&[], 0, 2);
        svc.backoff_base = Duration::from_secs(1);
        assert_eq!(svc.backoff(1), Duration::from_secs(1));
        assert_eq!(svc.backoff(2), Duration::from_secs(4));
        assert_eq!(svc.backoff(3), Duration::from_secs(16));
    }
}
