//! Report run domain model.
//!
//! A run is one attempted execution of a schedule. It is inserted in flight
//! when the schedule is claimed and closed exactly once by the recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report_schedule::ReportSchedule;

/// Maximum stored length of a run's error summary, in characters.
pub const ERROR_SUMMARY_MAX_LEN: usize = 1000;

/// What caused a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    /// Some sections were collected, some failed.
    Partial,
    Failure,
    /// Stopped by orderly shutdown; does not count toward the failure limit.
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failure" => Some(Self::Failure),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Success and partial both count as a successful run for the state machine.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

/// Per-recipient delivery status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String },
}

/// Result of delivering one run's artifact to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub recipient: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
    pub attempts: u32,
}

impl DeliveryResult {
    pub fn delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered)
    }
}

/// Half-open data window `[start, end)` a run collected over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Reference to a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Opaque storage key understood by the artifact store.
    pub key: String,
    pub mime_type: String,
    pub filename: String,
}

/// A rendered report file, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

/// One attempted execution of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRun {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub trigger: RunTrigger,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    /// `None` while the run is in flight.
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    pub artifact: Option<ArtifactRef>,
    pub error_summary: Option<String>,
    pub deliveries: Vec<DeliveryResult>,
    pub window: Option<CollectorWindow>,
}

impl ReportRun {
    pub fn is_in_flight(&self) -> bool {
        self.finished_at.is_none()
    }
}

/// A schedule claimed under a lease, with the in-flight run row created for it.
///
/// Workers only ever see this read-only snapshot of the schedule.
#[derive(Debug, Clone)]
pub struct ClaimedRun {
    pub run_id: Uuid,
    pub schedule: ReportSchedule,
    pub lease_holder: String,
    pub trigger: RunTrigger,
    pub scheduled_for: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
    /// Window end of the most recent finished run of this schedule.
    pub previous_window_end: Option<DateTime<Utc>>,
}

/// What a worker hands back to the recorder when a run terminates.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub artifact: Option<ArtifactRef>,
    pub error_summary: Option<String>,
    pub deliveries: Vec<DeliveryResult>,
    pub window: Option<CollectorWindow>,
}

impl RunResult {
    pub fn failure(summary: impl AsRef<str>) -> Self {
        Self {
            outcome: RunOutcome::Failure,
            artifact: None,
            error_summary: Some(bound_error_summary(summary.as_ref())),
            deliveries: Vec::new(),
            window: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            outcome: RunOutcome::Cancelled,
            artifact: None,
            error_summary: Some("cancelled by shutdown".to_string()),
            deliveries: Vec::new(),
            window: None,
        }
    }

    pub fn with_window(mut self, window: CollectorWindow) -> Self {
        self.window = Some(window);
        self
    }
}

/// Truncate an error summary to [`ERROR_SUMMARY_MAX_LEN`] characters.
pub fn bound_error_summary(summary: &str) -> String {
    match summary.char_indices().nth(ERROR_SUMMARY_MAX_LEN) {
        Some((cut, _)) => summary[..cut].to_string(),
        None => summary.to_string(),
    }
}
