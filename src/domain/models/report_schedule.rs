//! Recurring report schedule domain model.
//!
//! A ReportSchedule is the durable definition of a report that is produced
//! on a cadence, rendered into a file format, and mailed to recipients.
//! The dispatcher only ever advances `next_run` once a run has terminated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cadence;
use super::recipients::Recipients;

/// Maximum length of a report title, in characters.
pub const REPORT_TITLE_MAX_LEN: usize = 255;

/// Kind of report; selects the data collection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Production,
    Quality,
    Performance,
    Cost,
    Safety,
    Custom,
}

impl ReportType {
    pub const ALL: [Self; 6] = [
        Self::Production,
        Self::Quality,
        Self::Performance,
        Self::Cost,
        Self::Safety,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Quality => "quality",
            Self::Performance => "performance",
            Self::Cost => "cost",
            Self::Safety => "safety",
            Self::Custom => "custom",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "quality" => Some(Self::Quality),
            "performance" => Some(Self::Performance),
            "cost" => Some(Self::Cost),
            "safety" => Some(Self::Safety),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    /// Never dispatched automatically; runs only through an explicit trigger.
    OnDemand,
}

impl Frequency {
    pub const ALL: [Self; 5] = [
        Self::Daily,
        Self::Weekly,
        Self::Monthly,
        Self::Quarterly,
        Self::OnDemand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::OnDemand => "on_demand",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "on_demand" | "on-demand" => Some(Self::OnDemand),
            _ => None,
        }
    }

    pub fn is_on_demand(&self) -> bool {
        matches!(self, Self::OnDemand)
    }
}

/// Artifact format produced by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Pdf,
    Csv,
    Xlsx,
}

impl ReportFormat {
    pub const ALL: [Self; 3] = [Self::Pdf, Self::Csv, Self::Xlsx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

/// Lifecycle status of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Dispatched whenever `next_run` comes due.
    Active,
    /// Kept, but never dispatched until resumed.
    Paused,
    /// Hit the consecutive failure limit; needs an admin reset.
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Dispatcher lease stamped on a schedule row while one of its runs is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Validated input for creating a schedule.
#[derive(Debug, Clone)]
pub struct NewReportSchedule {
    pub report_title: String,
    pub report_type: ReportType,
    pub frequency: Frequency,
    /// Explicit first run; defaults to one cadence step after creation.
    pub next_run: Option<DateTime<Utc>>,
    pub recipients: Recipients,
    pub format: ReportFormat,
    pub site_code: Option<String>,
    pub created_by: Option<String>,
}

/// A persistent report schedule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSchedule {
    pub id: Uuid,
    pub report_title: String,
    pub report_type: ReportType,
    pub frequency: Frequency,
    /// Next dispatch instant. `cadence::never()` for on-demand schedules.
    pub next_run: DateTime<Utc>,
    pub recipients: Recipients,
    pub format: ReportFormat,
    pub status: ScheduleStatus,
    /// Site tag carried for the operations platform; not an isolation boundary.
    pub site_code: Option<String>,

    // -- State machine counters --
    pub consecutive_failures: u32,
    pub partial_streak: u32,

    // -- Dispatch bookkeeping --
    pub lease: Option<Lease>,
    /// Set when the schedule was deleted while a run was in flight.
    pub deleted_at: Option<DateTime<Utc>>,

    // -- Audit --
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl ReportSchedule {
    /// Build an active schedule from validated input.
    pub fn new(input: NewReportSchedule, now: DateTime<Utc>) -> Self {
        let next_run = if input.frequency.is_on_demand() {
            cadence::never()
        } else {
            input
                .next_run
                .unwrap_or_else(|| cadence::next(input.frequency, now))
        };

        Self {
            id: Uuid::new_v4(),
            report_title: input.report_title,
            report_type: input.report_type,
            frequency: input.frequency,
            next_run,
            recipients: input.recipients,
            format: input.format,
            status: ScheduleStatus::Active,
            site_code: input.site_code,
            consecutive_failures: 0,
            partial_streak: 0,
            lease: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            created_by: input.created_by,
        }
    }

    /// Whether a dispatcher lease is currently live on this schedule.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease.as_ref().is_some_and(|lease| !lease.is_expired(now))
    }

    /// Whether the dispatcher may claim this schedule at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active
            && self.deleted_at.is_none()
            && !cadence::is_never(self.next_run)
            && self.next_run <= now
            && !self.is_leased(now)
    }

    /// `next_run` as presented to API callers: `None` when it never fires.
    pub fn visible_next_run(&self) -> Option<DateTime<Utc>> {
        (!cadence::is_never(self.next_run)).then_some(self.next_run)
    }
}
