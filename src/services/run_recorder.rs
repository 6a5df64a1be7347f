//! Run recorder: the single place a run is closed.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::schedule_state::partial_streak_alert;
use crate::domain::models::{CatchupPolicy, ClaimedRun, FinalizePolicy, ReportsConfig, RunResult, ScheduleStatus};
use crate::domain::ports::clock::Clock;
use crate::domain::ports::report_schedule_repository::{FinalizedRun, ReportScheduleRepository};

const FINALIZE_ATTEMPTS: u32 = 3;
const FINALIZE_RETRY_DELAY: Duration = Duration::from_millis(250);

pub struct RunRecorder {
    repo: Arc<dyn ReportScheduleRepository>,
    clock: Arc<dyn Clock>,
    failure_limit: u32,
    catchup: CatchupPolicy,
}

impl RunRecorder {
    pub fn new(repo: Arc<dyn ReportScheduleRepository>, clock: Arc<dyn Clock>, config: &ReportsConfig) -> Self {
        Self {
            repo,
            clock,
            failure_limit: config.failure_limit,
            catchup: config.catchup_policy,
        }
    }

    fn policy(&self) -> FinalizePolicy {
        FinalizePolicy {
            failure_limit: self.failure_limit,
            catchup: self.catchup,
            now: self.clock.now(),
        }
    }

    /// Close `claim`'s run with `result` and move its schedule.
    ///
    /// Store errors are retried briefly. If they persist the run stays in
    /// flight until its lease expires and the next claim records it as failed.
    pub async fn record(&self, claim: &ClaimedRun, result: RunResult) -> DomainResult<FinalizedRun> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let policy = self.policy();
            match self.repo.finalize_run(claim, &result, &policy).await {
                Ok(finalized) => {
                    self.log_finalized(claim, &finalized, &policy);
                    return Ok(finalized);
                }
                Err(DomainError::StaleLease { schedule_id, run_id }) => {
                    tracing::warn!(
                        %schedule_id,
                        %run_id,
                        outcome = result.outcome.as_str(),
                        "Lease was reclaimed before the run finished; result discarded"
                    );
                    return Err(DomainError::StaleLease { schedule_id, run_id });
                }
                Err(e) if e.is_store_error() && attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(run_id = %claim.run_id, attempt, error = %e, "Finalize failed; retrying");
                    tokio::time::sleep(FINALIZE_RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::error!(run_id = %claim.run_id, error = %e, "Could not record run");
                    return Err(e);
                }
            }
        }
    }

    fn log_finalized(&self, claim: &ClaimedRun, finalized: &FinalizedRun, policy: &FinalizePolicy) {
        let outcome = finalized.run.outcome.map_or("unknown", |o| o.as_str());
        let delivered = finalized.run.deliveries.iter().filter(|d| d.delivered()).count();

        let Some(update) = &finalized.schedule_update else {
            tracing::info!(
                schedule_id = %claim.schedule.id,
                run_id = %claim.run_id,
                outcome,
                "Run finished; schedule was deleted and has been purged"
            );
            return;
        };

        tracing::info!(
            schedule_id = %claim.schedule.id,
            run_id = %claim.run_id,
            trigger = claim.trigger.as_str(),
            outcome,
            delivered,
            recipients = finalized.run.deliveries.len(),
            next_run = %update.next_run,
            "Run finished"
        );

        if update.status == ScheduleStatus::Failed && claim.schedule.status != ScheduleStatus::Failed {
            tracing::error!(
                schedule_id = %claim.schedule.id,
                consecutive_failures = update.consecutive_failures,
                "Schedule reached the failure limit and is now failed"
            );
        }
        if partial_streak_alert(update, policy) {
            tracing::warn!(
                schedule_id = %claim.schedule.id,
                partial_streak = update.partial_streak,
                "Schedule keeps producing partial reports"
            );
        }
    }
}
