pub mod cadence;
pub mod config;
pub mod identity;
pub mod recipients;
pub mod report_data;
pub mod report_run;
pub mod report_schedule;
pub mod schedule_input;
pub mod schedule_state;

pub use config::{
    CatchupPolicy, Config, DatabaseConfig, LoggingConfig, ReportsConfig, ServerConfig, SmtpConfig,
};
pub use identity::{Identity, Role};
pub use recipients::Recipients;
pub use report_data::{Aggregator, CellValue, Kpi, ReportData, Section, SectionFailure};
pub use report_run::{
    bound_error_summary, ArtifactRef, ClaimedRun, CollectorWindow, DeliveryResult, DeliveryStatus, RenderedArtifact,
    ReportRun, RunOutcome, RunResult, RunTrigger,
};
pub use report_schedule::{
    Frequency, Lease, NewReportSchedule, ReportFormat, ReportSchedule, ReportType, ScheduleStatus,
};
pub use schedule_input::{ScheduleDraft, SchedulePatch, SchedulePatchDraft, StatusChange};
pub use schedule_state::{FinalizePolicy, ScheduleUpdate};
