//! Repository port for report schedule and run persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    CatchupPolicy, ClaimedRun, FinalizePolicy, ReportRun, ReportSchedule, ReportType, RunResult,
    ScheduleStatus, ScheduleUpdate,
};

/// Filter for listing report schedules.
#[derive(Debug, Default, Clone)]
pub struct ReportScheduleFilter {
    pub status: Option<ScheduleStatus>,
    pub report_type: Option<ReportType>,
}

/// How a delete request was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The schedule and its run history are gone.
    Removed,
    /// A run was in flight; the schedule is hidden and purged when the run finalizes.
    Deferred,
}

/// Parameters for taking a dispatch lease.
#[derive(Debug, Clone)]
pub struct ClaimOptions {
    /// Unique id of the claiming dispatcher process.
    pub dispatcher_id: String,
    pub lease_ttl: chrono::Duration,
    /// Applied to runs whose lease expired before they finalized.
    pub failure_limit: u32,
    pub catchup: CatchupPolicy,
}

impl ClaimOptions {
    pub fn expiry_policy(&self, now: DateTime<Utc>) -> FinalizePolicy {
        FinalizePolicy {
            failure_limit: self.failure_limit,
            catchup: self.catchup,
            now,
        }
    }
}

/// A closed run and what it did to its schedule.
#[derive(Debug, Clone)]
pub struct FinalizedRun {
    pub run: ReportRun,
    /// `None` when the schedule had been deleted during the run and was purged.
    pub schedule_update: Option<ScheduleUpdate>,
}

#[async_trait]
pub trait ReportScheduleRepository: Send + Sync {
    /// Persist a new, already validated schedule.
    async fn create(&self, schedule: &ReportSchedule) -> DomainResult<()>;

    /// Get a schedule by ID. Soft-deleted schedules are not returned.
    async fn get(&self, id: Uuid) -> DomainResult<Option<ReportSchedule>>;

    /// List schedules with optional filter, oldest first.
    async fn list(&self, filter: ReportScheduleFilter) -> DomainResult<Vec<ReportSchedule>>;

    /// Write the editable fields, status and counters of an existing schedule.
    ///
    /// The write only applies if the stored row still has `expected_updated_at`,
    /// otherwise it fails with `Conflict`. Lease columns are never touched.
    async fn update(&self, schedule: &ReportSchedule, expected_updated_at: DateTime<Utc>) -> DomainResult<()>;

    /// Hard delete, or soft delete while a run is in flight.
    ///
    /// With `allow_soft = false` an in-flight run is a `Conflict`.
    async fn delete(&self, id: Uuid, allow_soft: bool) -> DomainResult<DeleteOutcome>;

    /// Atomically claim up to `limit` due schedules.
    ///
    /// Expires stale leases first, failing their orphaned runs. Each claimed
    /// schedule gets a fresh lease and an in-flight run row.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        options: &ClaimOptions,
    ) -> DomainResult<Vec<ClaimedRun>>;

    /// Claim one schedule for a manual run regardless of `next_run`.
    ///
    /// Fails with `Conflict` while another run of the schedule is in flight.
    async fn claim_one(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        options: &ClaimOptions,
    ) -> DomainResult<ClaimedRun>;

    /// Extend a lease still held by `holder`. Returns false if it was lost.
    async fn renew_lease(
        &self,
        schedule_id: Uuid,
        holder: &str,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Close the claimed run with `result` and apply the schedule transition.
    ///
    /// Fails with `StaleLease` and changes nothing when the lease was reclaimed.
    async fn finalize_run(
        &self,
        claim: &ClaimedRun,
        result: &RunResult,
        policy: &FinalizePolicy,
    ) -> DomainResult<FinalizedRun>;

    /// Earliest `next_run` among claimable schedules.
    async fn next_due_at(&self) -> DomainResult<Option<DateTime<Utc>>>;

    /// Runs of a schedule, newest first.
    async fn list_runs(&self, schedule_id: Uuid, limit: usize) -> DomainResult<Vec<ReportRun>>;

    /// Get a run by ID.
    async fn get_run(&self, run_id: Uuid) -> DomainResult<Option<ReportRun>>;

    /// Most recently finished run of a schedule.
    async fn latest_finished_run(&self, schedule_id: Uuid) -> DomainResult<Option<ReportRun>>;
}
