//! Service for managing report schedules.
//!
//! Coordinates between ReportScheduleRepository (persistence), the worker
//! pool (manual runs) and the dispatcher (woken after every edit).

use std::sync::Arc;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::schedule_state;
use crate::domain::models::{
    ArtifactRef, ReportRun, ReportSchedule, ScheduleDraft, SchedulePatchDraft,
};
use crate::domain::ports::artifact_store::ArtifactStore;
use crate::domain::ports::clock::Clock;
use crate::domain::ports::report_schedule_repository::{
    ClaimOptions, DeleteOutcome, ReportScheduleFilter, ReportScheduleRepository,
};
use crate::services::worker_pool::WorkerPool;

/// Attempts at a read-modify-write before giving up on a concurrent edit.
const EDIT_ATTEMPTS: u32 = 3;

/// Default number of runs returned by `list_runs`.
pub const DEFAULT_RUN_HISTORY: usize = 50;

pub struct ReportScheduleService {
    repo: Arc<dyn ReportScheduleRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
    claim_options: ClaimOptions,
}

impl ReportScheduleService {
    pub fn new(
        repo: Arc<dyn ReportScheduleRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        pool: Arc<WorkerPool>,
        clock: Arc<dyn Clock>,
        wake: Arc<Notify>,
        claim_options: ClaimOptions,
    ) -> Self {
        Self {
            repo,
            artifacts,
            pool,
            clock,
            wake,
            claim_options,
        }
    }

    /// Validate and persist a new schedule.
    pub async fn create_schedule(
        &self,
        draft: ScheduleDraft,
        created_by: Option<String>,
    ) -> DomainResult<ReportSchedule> {
        let now = self.clock.now();
        let input = draft.validate(created_by, now)?;
        let schedule = ReportSchedule::new(input, now);

        self.repo.create(&schedule).await?;
        self.wake.notify_one();

        tracing::info!(
            schedule_id = %schedule.id,
            report_type = schedule.report_type.as_str(),
            frequency = schedule.frequency.as_str(),
            next_run = %schedule.next_run,
            "Report schedule created"
        );
        Ok(schedule)
    }

    /// Get a schedule by ID.
    pub async fn get_schedule(&self, id: Uuid) -> DomainResult<ReportSchedule> {
        self.repo.get(id).await?.ok_or(DomainError::ScheduleNotFound(id))
    }

    /// List schedules with optional filter.
    pub async fn list_schedules(&self, filter: ReportScheduleFilter) -> DomainResult<Vec<ReportSchedule>> {
        self.repo.list(filter).await
    }

    /// Apply a partial update.
    pub async fn update_schedule(&self, id: Uuid, draft: SchedulePatchDraft) -> DomainResult<ReportSchedule> {
        let patch = draft.validate(self.clock.now())?;
        let schedule = self
            .modify(id, |schedule, now| patch.clone().apply(schedule, now))
            .await?;
        tracing::info!(schedule_id = %id, status = schedule.status.as_str(), "Report schedule updated");
        Ok(schedule)
    }

    /// Pause a schedule. Pausing a failed schedule is rejected.
    pub async fn pause_schedule(&self, id: Uuid) -> DomainResult<ReportSchedule> {
        let schedule = self.modify(id, schedule_state::pause).await?;
        tracing::info!(schedule_id = %id, "Report schedule paused");
        Ok(schedule)
    }

    /// Resume a paused schedule on its original phase.
    pub async fn resume_schedule(&self, id: Uuid) -> DomainResult<ReportSchedule> {
        let schedule = self
            .modify(id, |schedule, now| {
                schedule_state::resume(schedule, now);
                Ok(())
            })
            .await?;
        tracing::info!(schedule_id = %id, next_run = %schedule.next_run, "Report schedule resumed");
        Ok(schedule)
    }

    /// Admin reset: active again with cleared counters.
    pub async fn reset_schedule(&self, id: Uuid) -> DomainResult<ReportSchedule> {
        let schedule = self
            .modify(id, |schedule, now| {
                schedule_state::reset(schedule, now);
                Ok(())
            })
            .await?;
        tracing::info!(schedule_id = %id, next_run = %schedule.next_run, "Report schedule reset");
        Ok(schedule)
    }

    /// Delete a schedule. With a run in flight the delete is deferred until
    /// the run finishes, or refused when `allow_soft` is false.
    pub async fn delete_schedule(&self, id: Uuid, allow_soft: bool) -> DomainResult<DeleteOutcome> {
        let outcome = self.repo.delete(id, allow_soft).await?;
        self.wake.notify_one();
        tracing::info!(schedule_id = %id, ?outcome, "Report schedule deleted");
        Ok(outcome)
    }

    /// Start a manual run now, independent of `next_run`. Returns the run id.
    pub async fn trigger_run(&self, id: Uuid) -> DomainResult<Uuid> {
        let claim = self.repo.claim_one(id, self.clock.now(), &self.claim_options).await?;
        let run_id = claim.run_id;
        tracing::info!(schedule_id = %id, %run_id, "Manual run requested");
        self.pool.submit(claim);
        Ok(run_id)
    }

    /// Run history of a schedule, newest first.
    pub async fn list_runs(&self, schedule_id: Uuid, limit: usize) -> DomainResult<Vec<ReportRun>> {
        self.get_schedule(schedule_id).await?;
        self.repo.list_runs(schedule_id, limit).await
    }

    pub async fn get_run(&self, run_id: Uuid) -> DomainResult<ReportRun> {
        self.repo.get_run(run_id).await?.ok_or(DomainError::RunNotFound(run_id))
    }

    /// The stored artifact of a run and its bytes.
    pub async fn artifact(&self, run_id: Uuid) -> DomainResult<(ArtifactRef, Vec<u8>)> {
        let run = self.get_run(run_id).await?;
        let artifact = run.artifact.ok_or(DomainError::ArtifactNotFound(run_id))?;
        let bytes = self.artifacts.get(run_id, &artifact).await?;
        Ok((artifact, bytes))
    }

    /// Read-modify-write with optimistic concurrency against finalize and other edits.
    async fn modify<F>(&self, id: Uuid, mut change: F) -> DomainResult<ReportSchedule>
    where
        F: FnMut(&mut ReportSchedule, chrono::DateTime<chrono::Utc>) -> DomainResult<()>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut schedule = self.get_schedule(id).await?;
            let expected = schedule.updated_at;
            let now = self.clock.now();

            change(&mut schedule, now)?;
            // Keep updated_at strictly moving so the next edit can fence on it.
            if schedule.updated_at <= expected {
                schedule.updated_at = expected + chrono::Duration::microseconds(1);
            }

            match self.repo.update(&schedule, expected).await {
                Ok(()) => {
                    self.wake.notify_one();
                    return Ok(schedule);
                }
                Err(DomainError::Conflict(reason)) if attempt < EDIT_ATTEMPTS => {
                    tracing::debug!(schedule_id = %id, attempt, %reason, "Concurrent edit; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
