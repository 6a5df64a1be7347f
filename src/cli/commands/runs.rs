//! `runs`: run history of a schedule.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::id_resolver::{resolve_run_id, resolve_schedule_id};
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::config::Config;
use crate::domain::models::{DeliveryResult, DeliveryStatus, ReportRun};
use crate::infrastructure::setup::{build_runtime, open_database};
use crate::services::report_schedule_service::DEFAULT_RUN_HISTORY;

#[derive(Args, Debug)]
pub struct RunsArgs {
    /// Schedule ID or unique prefix
    pub schedule_id: Option<String>,

    /// Show a single run instead of a schedule's history
    #[arg(long, conflicts_with = "schedule_id")]
    pub run: Option<String>,

    /// Maximum number of runs to display
    #[arg(short, long, default_value_t = DEFAULT_RUN_HISTORY)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct DeliveryOutput {
    pub recipient: String,
    pub delivered: bool,
    pub attempts: u32,
    pub reason: Option<String>,
}

impl From<&DeliveryResult> for DeliveryOutput {
    fn from(d: &DeliveryResult) -> Self {
        let reason = match &d.status {
            DeliveryStatus::Delivered => None,
            DeliveryStatus::Failed { reason } => Some(reason.clone()),
        };
        Self {
            recipient: d.recipient.clone(),
            delivered: d.delivered(),
            attempts: d.attempts,
            reason,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub id: String,
    pub schedule_id: String,
    pub trigger: String,
    pub scheduled_for: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub outcome: Option<String>,
    pub error_summary: Option<String>,
    pub artifact: Option<String>,
    pub window: Option<String>,
    pub deliveries: Vec<DeliveryOutput>,
}

impl From<&ReportRun> for RunOutput {
    fn from(r: &ReportRun) -> Self {
        Self {
            id: r.id.to_string(),
            schedule_id: r.schedule_id.to_string(),
            trigger: r.trigger.as_str().to_string(),
            scheduled_for: r.scheduled_for.to_rfc3339(),
            started_at: r.started_at.to_rfc3339(),
            finished_at: r.finished_at.map(|t| t.to_rfc3339()),
            outcome: r.outcome.map(|o| o.as_str().to_string()),
            error_summary: r.error_summary.clone(),
            artifact: r.artifact.as_ref().map(|a| a.filename.clone()),
            window: r.window.map(|w| format!("{} .. {}", w.start.to_rfc3339(), w.end.to_rfc3339())),
            deliveries: r.deliveries.iter().map(DeliveryOutput::from).collect(),
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Run: {}", self.id),
            format!("Schedule: {}", self.schedule_id),
            format!("Trigger: {}", self.trigger),
            format!("Outcome: {}", self.outcome.as_deref().unwrap_or("running")),
            format!("Scheduled For: {}", self.scheduled_for),
            format!("Started: {}", self.started_at),
        ];
        if let Some(ref finished) = self.finished_at {
            lines.push(format!("Finished: {finished}"));
        }
        if let Some(ref window) = self.window {
            lines.push(format!("Window: {window}"));
        }
        if let Some(ref artifact) = self.artifact {
            lines.push(format!("Artifact: {artifact}"));
        }
        if let Some(ref error) = self.error_summary {
            lines.push(format!("Errors: {error}"));
        }
        if !self.deliveries.is_empty() {
            lines.push("Deliveries:".to_string());
            for d in &self.deliveries {
                let status = match &d.reason {
                    None => "delivered".to_string(),
                    Some(reason) => format!("failed ({reason})"),
                };
                lines.push(format!("  {} {} after {} attempt(s)", d.recipient, status, d.attempts));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct RunListOutput {
    pub schedule_id: String,
    pub runs: Vec<RunOutput>,
}

impl CommandOutput for RunListOutput {
    fn to_human(&self) -> String {
        if self.runs.is_empty() {
            return format!("No runs recorded for schedule {}.", self.schedule_id);
        }

        let mut t = table(&["ID", "TRIGGER", "OUTCOME", "SCHEDULED FOR", "FINISHED", "DELIVERED", "ARTIFACT"]);
        for r in &self.runs {
            let delivered = r.deliveries.iter().filter(|d| d.delivered).count();
            t.add_row(vec![
                r.id[..8].to_string(),
                r.trigger.clone(),
                r.outcome.clone().unwrap_or_else(|| "running".to_string()),
                r.scheduled_for.clone(),
                r.finished_at.clone().unwrap_or_else(|| "-".to_string()),
                format!("{delivered}/{}", r.deliveries.len()),
                r.artifact.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
        t.to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RunsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let runtime = build_runtime(pool.clone(), config)?;
    let service = runtime.service;

    match (args.run, args.schedule_id) {
        (Some(run), _) => {
            let run_id = resolve_run_id(&pool, &run).await?;
            let run = service.get_run(run_id).await?;
            output(&RunOutput::from(&run), json_mode);
        }
        (None, Some(schedule)) => {
            let schedule_id = resolve_schedule_id(&pool, &schedule).await?;
            let runs = service.list_runs(schedule_id, args.limit.max(1)).await?;
            let out = RunListOutput {
                schedule_id: schedule_id.to_string(),
                runs: runs.iter().map(RunOutput::from).collect(),
            };
            output(&out, json_mode);
        }
        (None, None) => anyhow::bail!("Specify a schedule ID or --run <RUN_ID>"),
    }

    pool.close().await;
    Ok(())
}
