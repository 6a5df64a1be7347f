//! SQLite adapter for ReportScheduleRepository.
//!
//! Claim, expiry and finalize each run in one transaction whose first
//! statement is a write, so concurrent dispatchers sharing the database
//! file serialize on SQLite's write lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::adapters::sqlite::{
    encode_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::schedule_state::{self, ScheduleUpdate};
use crate::domain::models::{
    ArtifactRef, ClaimedRun, CollectorWindow, FinalizePolicy, Frequency, Lease, Recipients,
    ReportFormat, ReportRun, ReportSchedule, ReportType, RunOutcome, RunResult, RunTrigger,
    ScheduleStatus,
};
use crate::domain::ports::report_schedule_repository::{
    ClaimOptions, DeleteOutcome, FinalizedRun, ReportScheduleFilter, ReportScheduleRepository,
};

/// Error summary recorded on runs whose worker stopped renewing its lease.
pub const LEASE_EXPIRED_SUMMARY: &str = "lease expired";

#[derive(Clone)]
pub struct SqliteReportScheduleRepository {
    pool: SqlitePool,
}

impl SqliteReportScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReportScheduleRow {
    id: String,
    report_title: String,
    report_type: String,
    frequency: String,
    next_run: String,
    recipients: String,
    format: String,
    status: String,
    site_code: Option<String>,
    consecutive_failures: i64,
    partial_streak: i64,
    lease_holder: Option<String>,
    lease_expires_at: Option<String>,
    deleted_at: Option<String>,
    created_at: String,
    updated_at: String,
    created_by: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ReportRunRow {
    id: String,
    schedule_id: String,
    run_trigger: String,
    scheduled_for: String,
    started_at: String,
    finished_at: Option<String>,
    outcome: Option<String>,
    artifact_ref: Option<String>,
    artifact_mime: Option<String>,
    artifact_filename: Option<String>,
    error_summary: Option<String>,
    deliveries: Option<String>,
    window_start: Option<String>,
    window_end: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ExpiredRunRow {
    schedule_id: String,
    run_trigger: String,
    scheduled_for: String,
}

fn unknown(column: &str, value: &str) -> DomainError {
    DomainError::SerializationError(format!("unknown {column} '{value}'"))
}

fn to_u32(column: &str, value: i64) -> DomainResult<u32> {
    u32::try_from(value).map_err(|_| DomainError::SerializationError(format!("{column} out of range: {value}")))
}

fn row_to_schedule(row: ReportScheduleRow) -> DomainResult<ReportSchedule> {
    let lease = match (row.lease_holder, row.lease_expires_at) {
        (Some(holder), Some(expires_at)) => Some(Lease {
            holder,
            expires_at: parse_datetime(&expires_at)?,
        }),
        _ => None,
    };

    Ok(ReportSchedule {
        id: parse_uuid(&row.id)?,
        report_type: ReportType::from_str(&row.report_type).ok_or_else(|| unknown("report_type", &row.report_type))?,
        frequency: Frequency::from_str(&row.frequency).ok_or_else(|| unknown("frequency", &row.frequency))?,
        format: ReportFormat::from_str(&row.format).ok_or_else(|| unknown("format", &row.format))?,
        status: ScheduleStatus::from_str(&row.status).ok_or_else(|| unknown("status", &row.status))?,
        report_title: row.report_title,
        next_run: parse_datetime(&row.next_run)?,
        recipients: Recipients::from_storage(&row.recipients)?,
        site_code: row.site_code,
        consecutive_failures: to_u32("consecutive_failures", row.consecutive_failures)?,
        partial_streak: to_u32("partial_streak", row.partial_streak)?,
        lease,
        deleted_at: parse_optional_datetime(row.deleted_at)?,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
        created_by: row.created_by,
    })
}

fn row_to_run(row: ReportRunRow) -> DomainResult<ReportRun> {
    let artifact = row.artifact_ref.map(|key| ArtifactRef {
        key,
        mime_type: row.artifact_mime.unwrap_or_default(),
        filename: row.artifact_filename.unwrap_or_default(),
    });
    let window = match (row.window_start, row.window_end) {
        (Some(start), Some(end)) => Some(CollectorWindow {
            start: parse_datetime(&start)?,
            end: parse_datetime(&end)?,
        }),
        _ => None,
    };
    let outcome = row
        .outcome
        .map(|o| RunOutcome::from_str(&o).ok_or_else(|| unknown("outcome", &o)))
        .transpose()?;

    Ok(ReportRun {
        id: parse_uuid(&row.id)?,
        schedule_id: parse_uuid(&row.schedule_id)?,
        trigger: RunTrigger::from_str(&row.run_trigger).ok_or_else(|| unknown("run_trigger", &row.run_trigger))?,
        scheduled_for: parse_datetime(&row.scheduled_for)?,
        started_at: parse_datetime(&row.started_at)?,
        finished_at: parse_optional_datetime(row.finished_at)?,
        outcome,
        artifact,
        error_summary: row.error_summary,
        deliveries: parse_json_or_default(row.deliveries)?,
        window,
    })
}

async fn fetch_schedule_any(conn: &mut SqliteConnection, id: &str) -> DomainResult<Option<ReportSchedule>> {
    let row: Option<ReportScheduleRow> = sqlx::query_as("SELECT * FROM reports_schedule WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(row_to_schedule).transpose()
}

async fn has_in_flight_run(conn: &mut SqliteConnection, id: &str) -> DomainResult<bool> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM reports_run WHERE schedule_id = ? AND finished_at IS NULL)")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(exists)
}

async fn previous_window_end(conn: &mut SqliteConnection, id: &str) -> DomainResult<Option<DateTime<Utc>>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT MAX(window_end) FROM reports_run
         WHERE schedule_id = ? AND finished_at IS NOT NULL AND window_end IS NOT NULL",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    parse_optional_datetime(row.and_then(|(end,)| end))
}

/// Write a state machine update and release the lease.
async fn write_schedule_update(
    conn: &mut SqliteConnection,
    id: &str,
    update: &ScheduleUpdate,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    sqlx::query(
        "UPDATE reports_schedule SET
         status = ?2, next_run = ?3, consecutive_failures = ?4, partial_streak = ?5,
         lease_holder = NULL, lease_expires_at = NULL, updated_at = ?6
         WHERE id = ?1",
    )
    .bind(id)
    .bind(update.status.as_str())
    .bind(encode_datetime(update.next_run))
    .bind(i64::from(update.consecutive_failures))
    .bind(i64::from(update.partial_streak))
    .bind(encode_datetime(now))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn purge_schedule(conn: &mut SqliteConnection, id: &str) -> DomainResult<()> {
    sqlx::query("DELETE FROM reports_schedule WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Fail the runs of every expired lease and release those leases. The
/// schedule keeps its `next_run`, so the same claim pass can take it again.
///
/// This is the opening write of every claim transaction.
async fn expire_stale_leases(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
    options: &ClaimOptions,
) -> DomainResult<usize> {
    let now_text = encode_datetime(now);
    let expired: Vec<ExpiredRunRow> = sqlx::query_as(
        "UPDATE reports_run
         SET finished_at = ?1, outcome = 'failure', error_summary = ?2
         WHERE finished_at IS NULL AND schedule_id IN (
             SELECT id FROM reports_schedule
             WHERE lease_holder IS NOT NULL AND lease_expires_at <= ?1
         )
         RETURNING schedule_id, run_trigger, scheduled_for",
    )
    .bind(&now_text)
    .bind(LEASE_EXPIRED_SUMMARY)
    .fetch_all(&mut *conn)
    .await?;

    let policy = options.expiry_policy(now);
    for run in &expired {
        let Some(schedule) = fetch_schedule_any(conn, &run.schedule_id).await? else {
            continue;
        };
        tracing::warn!(
            schedule_id = %schedule.id,
            holder = schedule.lease.as_ref().map(|l| l.holder.as_str()),
            trigger = %run.run_trigger,
            scheduled_for = %run.scheduled_for,
            "Lease expired before the run finalized; recording failure and releasing the slot"
        );
        if schedule.deleted_at.is_some() {
            purge_schedule(conn, &run.schedule_id).await?;
            continue;
        }
        let update = schedule_state::after_lease_expiry(&schedule, &policy);
        write_schedule_update(conn, &run.schedule_id, &update, now).await?;
    }

    // Leases left behind without an in-flight run.
    sqlx::query(
        "UPDATE reports_schedule SET lease_holder = NULL, lease_expires_at = NULL
         WHERE lease_holder IS NOT NULL AND lease_expires_at <= ?",
    )
    .bind(&now_text)
    .execute(&mut *conn)
    .await?;

    Ok(expired.len())
}

/// Stamp a lease on `schedule` and insert its in-flight run.
///
/// Returns `None` if another holder got there first.
async fn take_lease(
    conn: &mut SqliteConnection,
    mut schedule: ReportSchedule,
    trigger: RunTrigger,
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
    options: &ClaimOptions,
) -> DomainResult<Option<ClaimedRun>> {
    let run_id = Uuid::new_v4();
    let id = schedule.id.to_string();
    let lease = Lease {
        holder: format!("{}/{}", options.dispatcher_id, run_id),
        expires_at: now + options.lease_ttl,
    };

    let stamped = sqlx::query(
        "UPDATE reports_schedule SET lease_holder = ?2, lease_expires_at = ?3
         WHERE id = ?1 AND lease_holder IS NULL AND deleted_at IS NULL",
    )
    .bind(&id)
    .bind(&lease.holder)
    .bind(encode_datetime(lease.expires_at))
    .execute(&mut *conn)
    .await?;
    if stamped.rows_affected() == 0 {
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO reports_run (id, schedule_id, run_trigger, scheduled_for, started_at, deliveries)
         VALUES (?1, ?2, ?3, ?4, ?5, '[]')",
    )
    .bind(run_id.to_string())
    .bind(&id)
    .bind(trigger.as_str())
    .bind(encode_datetime(scheduled_for))
    .bind(encode_datetime(now))
    .execute(&mut *conn)
    .await?;

    let previous_window_end = previous_window_end(conn, &id).await?;
    let lease_holder = lease.holder.clone();
    schedule.lease = Some(lease);

    Ok(Some(ClaimedRun {
        run_id,
        schedule,
        lease_holder,
        trigger,
        scheduled_for,
        claimed_at: now,
        previous_window_end,
    }))
}

#[async_trait]
impl ReportScheduleRepository for SqliteReportScheduleRepository {
    async fn create(&self, schedule: &ReportSchedule) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO reports_schedule
             (id, report_title, report_type, frequency, next_run, recipients, format, status,
              site_code, consecutive_failures, partial_streak, created_at, updated_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(schedule.id.to_string())
        .bind(&schedule.report_title)
        .bind(schedule.report_type.as_str())
        .bind(schedule.frequency.as_str())
        .bind(encode_datetime(schedule.next_run))
        .bind(schedule.recipients.to_storage())
        .bind(schedule.format.as_str())
        .bind(schedule.status.as_str())
        .bind(&schedule.site_code)
        .bind(i64::from(schedule.consecutive_failures))
        .bind(i64::from(schedule.partial_streak))
        .bind(encode_datetime(schedule.created_at))
        .bind(encode_datetime(schedule.updated_at))
        .bind(&schedule.created_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ReportSchedule>> {
        let row: Option<ReportScheduleRow> =
            sqlx::query_as("SELECT * FROM reports_schedule WHERE id = ? AND deleted_at IS NULL")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_schedule).transpose()
    }

    async fn list(&self, filter: ReportScheduleFilter) -> DomainResult<Vec<ReportSchedule>> {
        let rows: Vec<ReportScheduleRow> = sqlx::query_as(
            "SELECT * FROM reports_schedule
             WHERE deleted_at IS NULL
               AND (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR report_type = ?2)
             ORDER BY created_at ASC, id ASC",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.report_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_schedule).collect()
    }

    async fn update(&self, schedule: &ReportSchedule, expected_updated_at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE reports_schedule SET
             report_title = ?2, report_type = ?3, frequency = ?4, next_run = ?5,
             recipients = ?6, format = ?7, status = ?8, site_code = ?9,
             consecutive_failures = ?10, partial_streak = ?11, updated_at = ?12
             WHERE id = ?1 AND deleted_at IS NULL AND updated_at = ?13",
        )
        .bind(schedule.id.to_string())
        .bind(&schedule.report_title)
        .bind(schedule.report_type.as_str())
        .bind(schedule.frequency.as_str())
        .bind(encode_datetime(schedule.next_run))
        .bind(schedule.recipients.to_storage())
        .bind(schedule.format.as_str())
        .bind(schedule.status.as_str())
        .bind(&schedule.site_code)
        .bind(i64::from(schedule.consecutive_failures))
        .bind(i64::from(schedule.partial_streak))
        .bind(encode_datetime(schedule.updated_at))
        .bind(encode_datetime(expected_updated_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(schedule.id).await? {
                Some(_) => Err(DomainError::Conflict(format!(
                    "schedule {} was modified concurrently",
                    schedule.id
                ))),
                None => Err(DomainError::ScheduleNotFound(schedule.id)),
            };
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid, allow_soft: bool) -> DomainResult<DeleteOutcome> {
        let id_text = id.to_string();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM reports_schedule
             WHERE id = ?1 AND deleted_at IS NULL
               AND NOT EXISTS (SELECT 1 FROM reports_run WHERE schedule_id = ?1 AND finished_at IS NULL)",
        )
        .bind(&id_text)
        .execute(&mut *tx)
        .await?;
        if removed.rows_affected() == 1 {
            tx.commit().await?;
            return Ok(DeleteOutcome::Removed);
        }

        let exists = fetch_schedule_any(&mut tx, &id_text)
            .await?
            .is_some_and(|s| s.deleted_at.is_none());
        if !exists {
            return Err(DomainError::ScheduleNotFound(id));
        }
        if !allow_soft {
            return Err(DomainError::Conflict(format!(
                "schedule {id} has a run in flight; retry later or allow a soft delete"
            )));
        }

        sqlx::query("UPDATE reports_schedule SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1")
            .bind(&id_text)
            .bind(encode_datetime(Utc::now()))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(DeleteOutcome::Deferred)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        options: &ClaimOptions,
    ) -> DomainResult<Vec<ClaimedRun>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        expire_stale_leases(&mut tx, now, options).await?;

        let rows: Vec<ReportScheduleRow> = sqlx::query_as(
            "SELECT * FROM reports_schedule s
             WHERE s.status = 'active' AND s.deleted_at IS NULL
               AND s.frequency != 'on_demand'
               AND s.next_run <= ?1
               AND s.lease_holder IS NULL
               AND NOT EXISTS (SELECT 1 FROM reports_run r WHERE r.schedule_id = s.id AND r.finished_at IS NULL)
             ORDER BY s.next_run ASC
             LIMIT ?2",
        )
        .bind(encode_datetime(now))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let schedule = row_to_schedule(row)?;
            let scheduled_for = schedule.next_run;
            if let Some(claim) = take_lease(&mut tx, schedule, RunTrigger::Scheduled, scheduled_for, now, options).await? {
                claimed.push(claim);
            }
        }

        tx.commit().await?;
        Ok(claimed)
    }

    async fn claim_one(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        options: &ClaimOptions,
    ) -> DomainResult<ClaimedRun> {
        let id_text = id.to_string();
        let mut tx = self.pool.begin().await?;
        expire_stale_leases(&mut tx, now, options).await?;

        let schedule = fetch_schedule_any(&mut tx, &id_text)
            .await?
            .filter(|s| s.deleted_at.is_none())
            .ok_or(DomainError::ScheduleNotFound(id))?;

        if schedule.lease.is_some() || has_in_flight_run(&mut tx, &id_text).await? {
            return Err(DomainError::Conflict(format!("a run of schedule {id} is already in flight")));
        }

        let claim = take_lease(&mut tx, schedule, RunTrigger::Manual, now, now, options)
            .await?
            .ok_or_else(|| DomainError::Conflict(format!("a run of schedule {id} is already in flight")))?;

        tx.commit().await?;
        Ok(claim)
    }

    async fn renew_lease(
        &self,
        schedule_id: Uuid,
        holder: &str,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE reports_schedule SET lease_expires_at = ?3 WHERE id = ?1 AND lease_holder = ?2",
        )
        .bind(schedule_id.to_string())
        .bind(holder)
        .bind(encode_datetime(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finalize_run(
        &self,
        claim: &ClaimedRun,
        result: &RunResult,
        policy: &FinalizePolicy,
    ) -> DomainResult<FinalizedRun> {
        let schedule_id = claim.schedule.id;
        let id_text = schedule_id.to_string();
        let stale = || DomainError::StaleLease {
            schedule_id,
            run_id: claim.run_id,
        };
        let deliveries = serde_json::to_string(&result.deliveries)?;

        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            "UPDATE reports_run SET
             finished_at = ?2, outcome = ?3, artifact_ref = ?4, artifact_mime = ?5,
             artifact_filename = ?6, error_summary = ?7, deliveries = ?8,
             window_start = ?9, window_end = ?10
             WHERE id = ?1 AND finished_at IS NULL",
        )
        .bind(claim.run_id.to_string())
        .bind(encode_datetime(policy.now))
        .bind(result.outcome.as_str())
        .bind(result.artifact.as_ref().map(|a| a.key.as_str()))
        .bind(result.artifact.as_ref().map(|a| a.mime_type.as_str()))
        .bind(result.artifact.as_ref().map(|a| a.filename.as_str()))
        .bind(result.error_summary.as_deref())
        .bind(&deliveries)
        .bind(result.window.map(|w| encode_datetime(w.start)))
        .bind(result.window.map(|w| encode_datetime(w.end)))
        .execute(&mut *tx)
        .await?;
        if closed.rows_affected() == 0 {
            return Err(stale());
        }

        let current = fetch_schedule_any(&mut tx, &id_text).await?.ok_or_else(stale)?;
        let holds_lease = current
            .lease
            .as_ref()
            .is_some_and(|lease| lease.holder == claim.lease_holder);
        if !holds_lease {
            // Dropping the transaction rolls the run update back.
            return Err(stale());
        }

        let schedule_update = if current.deleted_at.is_some() {
            purge_schedule(&mut tx, &id_text).await?;
            None
        } else {
            let update = schedule_state::after_run(&current, claim.trigger, claim.scheduled_for, result.outcome, policy);
            write_schedule_update(&mut tx, &id_text, &update, policy.now).await?;
            Some(update)
        };

        tx.commit().await?;

        Ok(FinalizedRun {
            run: ReportRun {
                id: claim.run_id,
                schedule_id,
                trigger: claim.trigger,
                scheduled_for: claim.scheduled_for,
                started_at: claim.claimed_at,
                finished_at: Some(policy.now),
                outcome: Some(result.outcome),
                artifact: result.artifact.clone(),
                error_summary: result.error_summary.clone(),
                deliveries: result.deliveries.clone(),
                window: result.window,
            },
            schedule_update,
        })
    }

    async fn next_due_at(&self) -> DomainResult<Option<DateTime<Utc>>> {
        let (next,): (Option<String>,) = sqlx::query_as(
            "SELECT MIN(next_run) FROM reports_schedule
             WHERE status = 'active' AND deleted_at IS NULL
               AND frequency != 'on_demand' AND lease_holder IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        parse_optional_datetime(next)
    }

    async fn list_runs(&self, schedule_id: Uuid, limit: usize) -> DomainResult<Vec<ReportRun>> {
        let rows: Vec<ReportRunRow> = sqlx::query_as(
            "SELECT * FROM reports_run WHERE schedule_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(schedule_id.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_run).collect()
    }

    async fn get_run(&self, run_id: Uuid) -> DomainResult<Option<ReportRun>> {
        let row: Option<ReportRunRow> = sqlx::query_as("SELECT * FROM reports_run WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_run).transpose()
    }

    async fn latest_finished_run(&self, schedule_id: Uuid) -> DomainResult<Option<ReportRun>> {
        let row: Option<ReportRunRow> = sqlx::query_as(
            "SELECT * FROM reports_run
             WHERE schedule_id = ? AND finished_at IS NOT NULL
             ORDER BY finished_at DESC, id DESC LIMIT 1",
        )
        .bind(schedule_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_run).transpose()
    }
}
