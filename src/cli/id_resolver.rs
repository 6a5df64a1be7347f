//! Short ID prefix resolution for CLI commands.
//!
//! Allows users to specify any unique prefix of a UUID instead of the full
//! 32-char ID, similar to git short hashes.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

const SCHEDULE_QUERY: &str = "SELECT id FROM reports_schedule WHERE id LIKE ? AND deleted_at IS NULL";
const RUN_QUERY: &str = "SELECT id FROM reports_run WHERE id LIKE ?";

/// Resolve a schedule ID prefix to a full UUID.
pub async fn resolve_schedule_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "schedule", SCHEDULE_QUERY).await
}

/// Resolve a run ID prefix to a full UUID.
pub async fn resolve_run_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "run", RUN_QUERY).await
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

async fn resolve_prefix(pool: &SqlitePool, prefix: &str, entity: &str, query: &str) -> Result<Uuid> {
    // Fast path: a full UUID needs no lookup
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }

    validate_prefix(prefix)?;

    let pattern = format!("{}%", prefix.to_ascii_lowercase());
    let rows: Vec<(String,)> = sqlx::query_as(query).bind(&pattern).fetch_all(pool).await?;

    match rows.as_slice() {
        [] => bail!("No {entity} found matching '{prefix}'"),
        [(id,)] => Ok(Uuid::parse_str(id)?),
        rows => {
            let mut msg = format!("Ambiguous prefix '{prefix}': matches {} {entity}s:", rows.len());
            for (id,) in rows {
                msg.push_str(&format!("\n  {id}"));
            }
            bail!("{msg}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::adapters::sqlite::SqliteReportScheduleRepository;
    use crate::domain::models::{Frequency, NewReportSchedule, Recipients, ReportFormat, ReportSchedule, ReportType};
    use crate::domain::ports::ReportScheduleRepository;
    use chrono::Utc;

    #[tokio::test]
    async fn test_resolves_unique_prefix_and_rejects_garbage() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteReportScheduleRepository::new(pool.clone());
        let now = Utc::now();
        let schedule = ReportSchedule::new(
            NewReportSchedule {
                report_title: "Daily".to_string(),
                report_type: ReportType::Production,
                frequency: Frequency::Daily,
                next_run: None,
                recipients: Recipients::default(),
                format: ReportFormat::Csv,
                site_code: None,
                created_by: None,
            },
            now,
        );
        repo.create(&schedule).await.unwrap();

        let prefix = &schedule.id.to_string()[..8];
        assert_eq!(resolve_schedule_id(&pool, prefix).await.unwrap(), schedule.id);
        assert!(resolve_schedule_id(&pool, "zz").await.is_err());
        assert!(resolve_run_id(&pool, prefix).await.is_err());
    }
}
