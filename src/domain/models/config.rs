use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for the reports service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Scheduler, worker pool and pipeline configuration
    #[serde(default)]
    pub reports: ReportsConfig,

    /// Outgoing mail configuration
    #[serde(default)]
    pub smtp: SmtpConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".texpro/texpro.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from any origin
    #[serde(default)]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: false,
        }
    }
}

/// What to do when a schedule falls behind by more than one cadence step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchupPolicy {
    /// Run every missed instant back to back.
    All,
    /// Run once over the missed span, then jump to the next future instant.
    #[default]
    Skip,
}

impl CatchupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Skip => "skip",
        }
    }
}

/// Scheduler, worker pool and pipeline configuration (`REPORTS_*` env)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportsConfig {
    /// Maximum concurrent report jobs per process
    #[serde(default = "default_worker_capacity")]
    pub worker_capacity: usize,

    /// Dispatcher wake-up interval
    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u64,

    /// Wall-clock budget of a single job
    #[serde(default = "default_job_deadline_seconds")]
    pub job_deadline_seconds: u64,

    /// Lifetime of a claim lease; renewed every third of it while a job runs
    #[serde(default = "default_lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,

    /// Retries per recipient after the first delivery attempt
    #[serde(default = "default_delivery_retries")]
    pub delivery_retries: u32,

    /// Base delay between delivery attempts; grows 4x per retry
    #[serde(default = "default_delivery_backoff_base_ms")]
    pub delivery_backoff_base_ms: u64,

    /// Consecutive failures before a schedule moves to `failed`
    #[serde(default = "default_failure_limit")]
    pub failure_limit: u32,

    #[serde(default)]
    pub catchup_policy: CatchupPolicy,

    /// Root directory for rendered artifacts
    #[serde(default = "default_artifact_root")]
    pub artifact_root: String,

    /// Per-call budget for an analytics aggregator
    #[serde(default = "default_aggregator_deadline_seconds")]
    pub aggregator_deadline_seconds: u64,

    /// How long shutdown waits for in-flight jobs before cancelling them
    #[serde(default = "default_drain_timeout_seconds")]
    pub drain_timeout_seconds: u64,
}

const fn default_worker_capacity() -> usize {
    4
}

const fn default_tick_interval_seconds() -> u64 {
    30
}

const fn default_job_deadline_seconds() -> u64 {
    600
}

const fn default_lease_ttl_seconds() -> u64 {
    120
}

const fn default_delivery_retries() -> u32 {
    2
}

const fn default_delivery_backoff_base_ms() -> u64 {
    1000
}

const fn default_failure_limit() -> u32 {
    3
}

fn default_artifact_root() -> String {
    ".texpro/artifacts".to_string()
}

const fn default_aggregator_deadline_seconds() -> u64 {
    60
}

const fn default_drain_timeout_seconds() -> u64 {
    30
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            worker_capacity: default_worker_capacity(),
            tick_interval_seconds: default_tick_interval_seconds(),
            job_deadline_seconds: default_job_deadline_seconds(),
            lease_ttl_seconds: default_lease_ttl_seconds(),
            delivery_retries: default_delivery_retries(),
            delivery_backoff_base_ms: default_delivery_backoff_base_ms(),
            failure_limit: default_failure_limit(),
            catchup_policy: CatchupPolicy::default(),
            artifact_root: default_artifact_root(),
            aggregator_deadline_seconds: default_aggregator_deadline_seconds(),
            drain_timeout_seconds: default_drain_timeout_seconds(),
        }
    }
}

impl ReportsConfig {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub const fn job_deadline(&self) -> Duration {
        Duration::from_secs(self.job_deadline_seconds)
    }

    pub const fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_seconds)
    }

    pub const fn delivery_backoff_base(&self) -> Duration {
        Duration::from_millis(self.delivery_backoff_base_ms)
    }

    pub const fn aggregator_deadline(&self) -> Duration {
        Duration::from_secs(self.aggregator_deadline_seconds)
    }

    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SmtpConfig {
    /// SMTP relay host; reports are only logged when unset
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Upgrade the connection with STARTTLS
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

const fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "TexPro Reports <reports@texpro.local>".to_string()
}

const fn default_starttls() -> bool {
    true
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            from_address: default_from_address(),
            starttls: default_starttls(),
        }
    }
}
