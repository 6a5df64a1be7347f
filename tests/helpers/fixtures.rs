//! Stub ports and a wired runtime driven by a manual clock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;

use texpro_reports::adapters::artifacts::FsArtifactStore;
use texpro_reports::adapters::sqlite::SqliteReportScheduleRepository;
use texpro_reports::domain::models::{
    Aggregator, CollectorWindow, Frequency, Kpi, NewReportSchedule, Recipients, RenderedArtifact,
    ReportData, ReportFormat, ReportSchedule, ReportType, ReportsConfig, ScheduleDraft, Section,
};
use texpro_reports::domain::ports::{
    AnalyticsError, AnalyticsSource, ClaimOptions, ManualClock, Mailer, MailerError, OutgoingEmail,
};
use texpro_reports::services::dispatcher::claim_options;
use texpro_reports::services::renderer::{RenderError, Renderer, RendererRegistry};
use texpro_reports::services::{ReportsRuntime, RuntimePorts};

use super::database::setup_test_db;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn draft(value: Value) -> ScheduleDraft {
    serde_json::from_value(value).expect("draft json")
}

/// Active schedule built directly, bypassing input validation.
pub fn schedule(frequency: Frequency, next_run: DateTime<Utc>, now: DateTime<Utc>) -> ReportSchedule {
    ReportSchedule::new(
        NewReportSchedule {
            report_title: "Daily Production".to_string(),
            report_type: ReportType::Production,
            frequency,
            next_run: Some(next_run),
            recipients: Recipients::parse(["ops@ex.com"]).unwrap(),
            format: ReportFormat::Csv,
            site_code: Some("CMDT-1".to_string()),
            created_by: Some("admin".to_string()),
        },
        now,
    )
}

pub fn options(dispatcher_id: &str) -> ClaimOptions {
    claim_options(dispatcher_id.to_string(), &test_config())
}

/// Fast retries and generous deadlines.
pub fn test_config() -> ReportsConfig {
    ReportsConfig {
        delivery_backoff_base_ms: 1,
        aggregator_deadline_seconds: 5,
        job_deadline_seconds: 30,
        drain_timeout_seconds: 1,
        ..ReportsConfig::default()
    }
}

/// Analytics source returning one small section per aggregator.
#[derive(Default)]
pub struct StubAnalytics {
    failing: Mutex<HashSet<Aggregator>>,
    hang: AtomicBool,
}

impl StubAnalytics {
    pub fn fail(&self, aggregator: Aggregator) {
        self.failing.lock().unwrap().insert(aggregator);
    }

    /// Make every call block until the caller gives up on it.
    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalyticsSource for StubAnalytics {
    async fn aggregate(&self, aggregator: Aggregator, _window: &CollectorWindow) -> Result<Section, AnalyticsError> {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(&aggregator) {
            return Err(AnalyticsError::Unavailable(format!("{} offline", aggregator.as_str())));
        }
        let mut section = Section::new(aggregator.as_str(), &["Item", "Value"]);
        section.push_row(vec!["LOOM-01".into(), 42_i64.into()]);
        section.push_kpi(Kpi::new("Total", 42.0, None));
        Ok(section)
    }
}

/// Mailer that records what it sends, or fails every send when told to.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub attempts: Mutex<u32>,
    unreachable: AtomicBool,
}

impl RecordingMailer {
    pub fn unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|e| e.to.clone()).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailerError> {
        *self.attempts.lock().unwrap() += 1;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MailerError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Renderer that always fails for its format.
pub struct BrokenRenderer(pub ReportFormat);

impl Renderer for BrokenRenderer {
    fn format(&self) -> ReportFormat {
        self.0
    }

    fn render(&self, _data: &ReportData) -> Result<RenderedArtifact, RenderError> {
        Err(RenderError::Csv("template exploded".to_string()))
    }
}

/// A complete runtime over an in-memory database.
pub struct Harness {
    pub pool: SqlitePool,
    pub repo: Arc<SqliteReportScheduleRepository>,
    pub clock: Arc<ManualClock>,
    pub analytics: Arc<StubAnalytics>,
    pub mailer: Arc<RecordingMailer>,
    pub artifacts_dir: TempDir,
    pub runtime: ReportsRuntime,
}

impl Harness {
    pub async fn new(now: DateTime<Utc>) -> Self {
        Self::build(setup_test_db().await, now, test_config(), RendererRegistry::new()).await
    }

    pub async fn with_renderers(now: DateTime<Utc>, renderers: RendererRegistry) -> Self {
        Self::build(setup_test_db().await, now, test_config(), renderers).await
    }

    pub async fn build(
        pool: SqlitePool,
        now: DateTime<Utc>,
        config: ReportsConfig,
        renderers: RendererRegistry,
    ) -> Self {
        let repo = Arc::new(SqliteReportScheduleRepository::new(pool.clone()));
        let clock = Arc::new(ManualClock::new(now));
        let analytics = Arc::new(StubAnalytics::default());
        let mailer = Arc::new(RecordingMailer::default());
        let artifacts_dir = tempfile::tempdir().expect("artifact dir");

        let ports = RuntimePorts {
            repo: repo.clone(),
            analytics: analytics.clone(),
            artifacts: Arc::new(FsArtifactStore::new(artifacts_dir.path())),
            mailer: mailer.clone(),
            clock: clock.clone(),
        };
        let runtime = ReportsRuntime::with_renderers(ports, &config, renderers);

        Self {
            pool,
            repo,
            clock,
            analytics,
            mailer,
            artifacts_dir,
            runtime,
        }
    }

    /// One dispatcher pass, then wait for every submitted job to be recorded.
    pub async fn tick(&self) -> usize {
        let claimed = self.runtime.dispatcher.dispatch_once().await.expect("dispatch");
        self.runtime.pool.wait_idle().await;
        claimed
    }
}
