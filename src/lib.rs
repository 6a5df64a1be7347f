//! TexPro Reports - scheduled report generation and delivery
//!
//! Recurring report schedules are claimed through a database lease by a
//! dispatcher, run on a bounded worker pool (collect, render, store,
//! deliver) and finalized through the schedule state machine.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, cadence and state machine rules, ports
//! - **Service Layer** (`services`): collector, renderers, delivery, worker pool, dispatcher
//! - **Adapters** (`adapters`): SQLite store and analytics, artifact files, SMTP, HTTP API
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, bootstrap
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, Frequency, ReportFormat, ReportRun, ReportSchedule, ReportType, ReportsConfig, RunOutcome,
    ScheduleStatus,
};
pub use domain::ports::{Clock, ReportScheduleRepository};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ReportScheduleService, ReportsRuntime};
