//! `schedule`: operator maintenance of report schedules.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::commands::runs::RunOutput;
use crate::cli::id_resolver::resolve_schedule_id;
use crate::cli::output::{output, short_id, table, truncate, CommandOutput};
use crate::domain::models::config::Config;
use crate::domain::models::{ReportSchedule, ReportType, ScheduleStatus};
use crate::domain::ports::{DeleteOutcome, ReportScheduleFilter};
use crate::infrastructure::setup::{build_runtime, open_database};

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub command: ScheduleCommands,
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// List report schedules
    List {
        /// Filter by status (active, paused, failed)
        #[arg(long)]
        status: Option<String>,

        /// Filter by report type
        #[arg(long = "type")]
        report_type: Option<String>,
    },

    /// Show details of a schedule
    Show {
        /// Schedule ID or unique prefix
        id: String,
    },

    /// Pause a schedule
    Pause {
        /// Schedule ID or unique prefix
        id: String,
    },

    /// Resume a paused schedule
    Resume {
        /// Schedule ID or unique prefix
        id: String,
    },

    /// Reactivate a schedule and clear its failure counters
    Reset {
        /// Schedule ID or unique prefix
        id: String,
    },

    /// Delete a schedule and its run history
    Delete {
        /// Schedule ID or unique prefix
        id: String,

        /// Refuse instead of deferring when a run is in flight
        #[arg(long)]
        hard: bool,
    },

    /// Run a schedule now and wait for the outcome
    Run {
        /// Schedule ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ScheduleOutput {
    pub id: String,
    pub report_title: String,
    pub report_type: String,
    pub frequency: String,
    pub format: String,
    pub status: String,
    pub next_run: Option<String>,
    pub recipients: Vec<String>,
    pub site_code: Option<String>,
    pub consecutive_failures: u32,
    pub partial_streak: u32,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&ReportSchedule> for ScheduleOutput {
    fn from(s: &ReportSchedule) -> Self {
        Self {
            id: s.id.to_string(),
            report_title: s.report_title.clone(),
            report_type: s.report_type.as_str().to_string(),
            frequency: s.frequency.as_str().to_string(),
            format: s.format.as_str().to_string(),
            status: s.status.as_str().to_string(),
            next_run: s.visible_next_run().map(|t| t.to_rfc3339()),
            recipients: s.recipients.as_slice().to_vec(),
            site_code: s.site_code.clone(),
            consecutive_failures: s.consecutive_failures,
            partial_streak: s.partial_streak,
            created_by: s.created_by.clone(),
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleListOutput {
    pub schedules: Vec<ScheduleOutput>,
    pub total: usize,
}

impl CommandOutput for ScheduleListOutput {
    fn to_human(&self) -> String {
        if self.schedules.is_empty() {
            return "No report schedules found.".to_string();
        }

        let mut t = table(&["ID", "TITLE", "TYPE", "FREQUENCY", "FORMAT", "STATUS", "NEXT RUN", "FAILURES"]);
        for s in &self.schedules {
            t.add_row(vec![
                s.id[..8].to_string(),
                truncate(&s.report_title, 30),
                s.report_type.clone(),
                s.frequency.clone(),
                s.format.clone(),
                s.status.clone(),
                s.next_run.clone().unwrap_or_else(|| "-".to_string()),
                s.consecutive_failures.to_string(),
            ]);
        }
        format!("Found {} report schedule(s):\n{t}", self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleDetailOutput {
    pub schedule: ScheduleOutput,
    pub recent_runs: Vec<RunOutput>,
}

impl CommandOutput for ScheduleDetailOutput {
    fn to_human(&self) -> String {
        let s = &self.schedule;
        let mut lines = vec![
            format!("Schedule: {}", s.report_title),
            format!("ID: {}", s.id),
            format!("Type: {}", s.report_type),
            format!("Frequency: {}", s.frequency),
            format!("Format: {}", s.format),
            format!("Status: {}", s.status),
            format!("Next Run: {}", s.next_run.as_deref().unwrap_or("-")),
            format!("Recipients: {}", s.recipients.join(", ")),
        ];
        if let Some(ref site) = s.site_code {
            lines.push(format!("Site: {site}"));
        }
        lines.push(format!("Consecutive Failures: {}", s.consecutive_failures));
        lines.push(format!("Partial Streak: {}", s.partial_streak));
        if let Some(ref by) = s.created_by {
            lines.push(format!("Created By: {by}"));
        }
        lines.push(format!("Created: {}", s.created_at));
        lines.push(format!("Updated: {}", s.updated_at));

        if !self.recent_runs.is_empty() {
            lines.push(String::new());
            lines.push("Recent Runs:".to_string());
            for run in &self.recent_runs {
                lines.push(format!(
                    "  {} {:<9} {:<8} {}",
                    &run.id[..8],
                    run.trigger,
                    run.outcome.as_deref().unwrap_or("running"),
                    run.started_at
                ));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for ScheduleActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

const DETAIL_RUNS: usize = 5;

pub async fn execute(args: ScheduleArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let runtime = build_runtime(pool.clone(), config)?;
    let service = runtime.service.clone();

    match args.command {
        ScheduleCommands::List { status, report_type } => {
            let filter = ReportScheduleFilter {
                status: status
                    .map(|s| ScheduleStatus::from_str(&s).with_context(|| format!("Unknown status '{s}'")))
                    .transpose()?,
                report_type: report_type
                    .map(|t| ReportType::from_str(&t).with_context(|| format!("Unknown report type '{t}'")))
                    .transpose()?,
            };
            let schedules = service.list_schedules(filter).await?;
            let out = ScheduleListOutput {
                total: schedules.len(),
                schedules: schedules.iter().map(ScheduleOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        ScheduleCommands::Show { id } => {
            let id = resolve_schedule_id(&pool, &id).await?;
            let schedule = service.get_schedule(id).await?;
            let runs = service.list_runs(id, DETAIL_RUNS).await?;
            let out = ScheduleDetailOutput {
                schedule: ScheduleOutput::from(&schedule),
                recent_runs: runs.iter().map(RunOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        ScheduleCommands::Pause { id } => {
            let id = resolve_schedule_id(&pool, &id).await?;
            let schedule = service.pause_schedule(id).await?;
            action(format!("Schedule paused: {} ({})", schedule.report_title, short_id(&id)), json_mode);
        }

        ScheduleCommands::Resume { id } => {
            let id = resolve_schedule_id(&pool, &id).await?;
            let schedule = service.resume_schedule(id).await?;
            action(
                format!(
                    "Schedule resumed: {} (next run {})",
                    schedule.report_title,
                    ScheduleOutput::from(&schedule).next_run.as_deref().unwrap_or("on demand")
                ),
                json_mode,
            );
        }

        ScheduleCommands::Reset { id } => {
            let id = resolve_schedule_id(&pool, &id).await?;
            let schedule = service.reset_schedule(id).await?;
            action(format!("Schedule reset: {} ({})", schedule.report_title, short_id(&id)), json_mode);
        }

        ScheduleCommands::Delete { id, hard } => {
            let id = resolve_schedule_id(&pool, &id).await?;
            let message = match service.delete_schedule(id, !hard).await? {
                DeleteOutcome::Removed => format!("Schedule deleted: {id}"),
                DeleteOutcome::Deferred => {
                    format!("Schedule {id} has a run in flight; it will be deleted when the run finishes")
                }
            };
            action(message, json_mode);
        }

        ScheduleCommands::Run { id } => {
            let id = resolve_schedule_id(&pool, &id).await?;
            let run_id = service.trigger_run(id).await?;
            runtime.pool.wait_idle().await;
            let run = service.get_run(run_id).await?;
            output(&RunOutput::from(&run), json_mode);
        }
    }

    pool.close().await;
    Ok(())
}

fn action(message: String, json_mode: bool) {
    output(&ScheduleActionOutput { success: true, message }, json_mode);
}
