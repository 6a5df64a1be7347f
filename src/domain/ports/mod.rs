//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that adapters must implement:
//! - ReportScheduleRepository: schedule and run persistence with leases
//! - AnalyticsSource: read-only aggregators over platform data
//! - ArtifactStore: rendered report files
//! - Mailer: outgoing email
//! - Clock: the current instant

pub mod analytics;
pub mod artifact_store;
pub mod clock;
pub mod mailer;
pub mod report_schedule_repository;

pub use analytics::{AnalyticsError, AnalyticsSource};
pub use artifact_store::ArtifactStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use mailer::{EmailAttachment, Mailer, MailerError, OutgoingEmail};
pub use report_schedule_repository::{
    ClaimOptions, DeleteOutcome, FinalizedRun, ReportScheduleFilter, ReportScheduleRepository,
};
