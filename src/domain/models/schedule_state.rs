//! Schedule state machine.
//!
//! ```text
//!   create ─▶ ACTIVE ──pause──▶ PAUSED ──resume──▶ ACTIVE
//!               │
//!               │ consecutive_failures >= limit
//!               ▼
//!             FAILED ──admin reset──▶ ACTIVE
//! ```
//!
//! Everything here is pure. The store applies the computed transition inside
//! its finalize transaction, and the service applies the manual ones.

use chrono::{DateTime, Utc};

use super::cadence;
use super::config::CatchupPolicy;
use super::report_run::{CollectorWindow, RunOutcome, RunTrigger};
use super::report_schedule::{Frequency, ReportSchedule, ScheduleStatus};
use crate::domain::errors::{DomainError, DomainResult};

/// Inputs that govern how a finished run moves its schedule.
#[derive(Debug, Clone, Copy)]
pub struct FinalizePolicy {
    pub failure_limit: u32,
    pub catchup: CatchupPolicy,
    pub now: DateTime<Utc>,
}

/// Schedule fields rewritten when a run is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub status: ScheduleStatus,
    pub next_run: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub partial_streak: u32,
}

impl ScheduleUpdate {
    fn unchanged(schedule: &ReportSchedule) -> Self {
        Self {
            status: schedule.status,
            next_run: schedule.next_run,
            consecutive_failures: schedule.consecutive_failures,
            partial_streak: schedule.partial_streak,
        }
    }

    pub fn apply_to(&self, schedule: &mut ReportSchedule) {
        schedule.status = self.status;
        schedule.next_run = self.next_run;
        schedule.consecutive_failures = self.consecutive_failures;
        schedule.partial_streak = self.partial_streak;
    }
}

/// Compute the schedule update for a run that ended with `outcome`.
///
/// `schedule` is the current stored row, not the worker's snapshot, so edits
/// made while the run was in flight (pause, resume, frequency change) win.
pub fn after_run(
    schedule: &ReportSchedule,
    trigger: RunTrigger,
    scheduled_for: DateTime<Utc>,
    outcome: RunOutcome,
    policy: &FinalizePolicy,
) -> ScheduleUpdate {
    let mut update = ScheduleUpdate::unchanged(schedule);

    match outcome {
        RunOutcome::Cancelled => return update,
        RunOutcome::Success => {
            update.consecutive_failures = 0;
            update.partial_streak = 0;
        }
        RunOutcome::Partial => {
            update.consecutive_failures = 0;
            update.partial_streak = schedule.partial_streak.saturating_add(1);
        }
        RunOutcome::Failure => {
            update.consecutive_failures = schedule.consecutive_failures.saturating_add(1);
            if update.consecutive_failures >= policy.failure_limit
                && schedule.status == ScheduleStatus::Active
            {
                // Keeps the last attempted next_run.
                update.status = ScheduleStatus::Failed;
                return update;
            }
        }
    }

    let advances = trigger == RunTrigger::Scheduled
        && schedule.status == ScheduleStatus::Active
        && schedule.next_run == scheduled_for;
    if advances {
        update.next_run = advance(schedule.frequency, scheduled_for, policy);
    }
    update
}

/// Compute the schedule update for a run whose lease ran out.
///
/// Counts as a failure toward the limit but keeps `next_run`, so the same
/// slot is claimed again by whichever dispatcher gets to it.
pub fn after_lease_expiry(schedule: &ReportSchedule, policy: &FinalizePolicy) -> ScheduleUpdate {
    let mut update = ScheduleUpdate::unchanged(schedule);
    update.consecutive_failures = schedule.consecutive_failures.saturating_add(1);
    if update.consecutive_failures >= policy.failure_limit && schedule.status == ScheduleStatus::Active {
        update.status = ScheduleStatus::Failed;
    }
    update
}

fn advance(frequency: Frequency, scheduled_for: DateTime<Utc>, policy: &FinalizePolicy) -> DateTime<Utc> {
    let next = cadence::next(frequency, scheduled_for);
    if next <= policy.now && policy.catchup == CatchupPolicy::Skip {
        cadence::fast_forward(frequency, scheduled_for, policy.now).next_future
    } else {
        next
    }
}

/// Data window for a run about to execute.
///
/// A scheduled run that is more than one step behind under the skip policy is
/// the single catch-up run and covers `[most recent missed instant, now)`.
/// Otherwise the window continues from the previous run's window end, or
/// reaches back one cadence step for the first run.
pub fn plan_window(
    frequency: Frequency,
    trigger: RunTrigger,
    scheduled_for: DateTime<Utc>,
    previous_window_end: Option<DateTime<Utc>>,
    catchup: CatchupPolicy,
    now: DateTime<Utc>,
) -> CollectorWindow {
    if trigger == RunTrigger::Scheduled
        && catchup == CatchupPolicy::Skip
        && cadence::next(frequency, scheduled_for) <= now
    {
        let missed = cadence::fast_forward(frequency, scheduled_for, now);
        return CollectorWindow {
            start: missed.last_missed,
            end: now,
        };
    }

    let end = scheduled_for;
    let start = previous_window_end
        .filter(|prev| *prev < end)
        .unwrap_or_else(|| cadence::previous(frequency, end));
    CollectorWindow { start, end }
}

/// Whether a partial streak has reached the alerting threshold.
pub fn partial_streak_alert(update: &ScheduleUpdate, policy: &FinalizePolicy) -> bool {
    update.partial_streak > 0 && update.partial_streak >= policy.failure_limit
}

/// ACTIVE -> PAUSED. Pausing a paused schedule is a no-op.
pub fn pause(schedule: &mut ReportSchedule, now: DateTime<Utc>) -> DomainResult<()> {
    match schedule.status {
        ScheduleStatus::Active => {
            schedule.status = ScheduleStatus::Paused;
            schedule.updated_at = now;
            Ok(())
        }
        ScheduleStatus::Paused => Ok(()),
        ScheduleStatus::Failed => Err(DomainError::InvalidStateTransition {
            from: schedule.status.as_str().to_string(),
            to: ScheduleStatus::Paused.as_str().to_string(),
            reason: "failed schedules must be reset before they can be paused".to_string(),
        }),
    }
}

/// PAUSED -> ACTIVE, recomputing `next_run` on the schedule's phase.
///
/// Resuming a failed schedule is an admin reset.
pub fn resume(schedule: &mut ReportSchedule, now: DateTime<Utc>) {
    if schedule.status == ScheduleStatus::Failed {
        reset(schedule, now);
        return;
    }
    schedule.status = ScheduleStatus::Active;
    schedule.next_run = cadence::reanchor(schedule.frequency, Some(schedule.next_run), now);
    schedule.updated_at = now;
}

/// Admin reset: back to ACTIVE with zeroed counters and a reanchored `next_run`.
pub fn reset(schedule: &mut ReportSchedule, now: DateTime<Utc>) {
    schedule.status = ScheduleStatus::Active;
    schedule.consecutive_failures = 0;
    schedule.partial_streak = 0;
    schedule.next_run = cadence::reanchor(schedule.frequency, Some(schedule.next_run), now);
    schedule.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::recipients::Recipients;
    use crate::domain::models::report_schedule::{NewReportSchedule, ReportFormat, ReportType};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn schedule(frequency: Frequency, next_run: DateTime<Utc>) -> ReportSchedule {
        ReportSchedule::new(
            NewReportSchedule {
                report_title: "Daily Production".to_string(),
                report_type: ReportType::Production,
                frequency,
                next_run: Some(next_run),
                recipients: Recipients::default(),
                format: ReportFormat::Csv,
                site_code: None,
                created_by: None,
            },
            next_run - chrono::Duration::days(1),
        )
    }

    fn policy(now: DateTime<Utc>) -> FinalizePolicy {
        FinalizePolicy {
            failure_limit: 3,
            catchup: CatchupPolicy::Skip,
            now,
        }
    }

    #[test]
    fn test_success_advances_from_scheduled_instant() {
        let due = at(2025, 1, 2, 6, 0);
        let s = schedule(Frequency::Daily, due);
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Success, &policy(at(2025, 1, 2, 6, 7)));
        assert_eq!(update.next_run, at(2025, 1, 3, 6, 0));
        assert_eq!(update.status, ScheduleStatus::Active);
    }

    #[test]
    fn test_quarterly_success_clamps() {
        let due = at(2025, 1, 31, 8, 0);
        let s = schedule(Frequency::Quarterly, due);
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Success, &policy(due));
        assert_eq!(update.next_run, at(2025, 4, 30, 8, 0));
    }

    #[test]
    fn test_failures_reach_limit_and_keep_next_run() {
        let due = at(2025, 1, 2, 6, 0);
        let mut s = schedule(Frequency::Daily, due);
        s.consecutive_failures = 2;
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Failure, &policy(due));
        assert_eq!(update.status, ScheduleStatus::Failed);
        assert_eq!(update.consecutive_failures, 3);
        assert_eq!(update.next_run, due);
    }

    #[test]
    fn test_failure_below_limit_advances() {
        let due = at(2025, 1, 2, 6, 0);
        let s = schedule(Frequency::Daily, due);
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Failure, &policy(due));
        assert_eq!(update.status, ScheduleStatus::Active);
        assert_eq!(update.consecutive_failures, 1);
        assert_eq!(update.next_run, at(2025, 1, 3, 6, 0));
    }

    #[test]
    fn test_partial_counts_as_success_and_streaks() {
        let due = at(2025, 1, 2, 6, 0);
        let mut s = schedule(Frequency::Daily, due);
        s.consecutive_failures = 2;
        s.partial_streak = 2;
        let p = policy(due);
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Partial, &p);
        assert_eq!(update.consecutive_failures, 0);
        assert_eq!(update.partial_streak, 3);
        assert!(partial_streak_alert(&update, &p));
    }

    #[test]
    fn test_cancelled_changes_nothing() {
        let due = at(2025, 1, 2, 6, 0);
        let mut s = schedule(Frequency::Daily, due);
        s.consecutive_failures = 1;
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Cancelled, &policy(due));
        assert_eq!(update.next_run, due);
        assert_eq!(update.consecutive_failures, 1);
    }

    #[test]
    fn test_manual_run_does_not_move_next_run() {
        let due = at(2025, 1, 2, 6, 0);
        let s = schedule(Frequency::Daily, due);
        let triggered = at(2025, 1, 1, 15, 0);
        let update = after_run(&s, RunTrigger::Manual, triggered, RunOutcome::Success, &policy(triggered));
        assert_eq!(update.next_run, due);
    }

    #[test]
    fn test_catchup_skip_fast_forwards() {
        let due = at(2025, 1, 2, 6, 0);
        let s = schedule(Frequency::Daily, due);
        let now = at(2025, 1, 5, 9, 0);
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Success, &policy(now));
        assert_eq!(update.next_run, at(2025, 1, 6, 6, 0));

        let all = FinalizePolicy {
            catchup: CatchupPolicy::All,
            ..policy(now)
        };
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Success, &all);
        assert_eq!(update.next_run, at(2025, 1, 3, 6, 0));
    }

    #[test]
    fn test_edit_during_run_wins() {
        let due = at(2025, 1, 2, 6, 0);
        let mut s = schedule(Frequency::Daily, due);
        s.status = ScheduleStatus::Paused;
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Success, &policy(due));
        assert_eq!(update.status, ScheduleStatus::Paused);
        assert_eq!(update.next_run, due);

        let s = schedule(Frequency::Daily, at(2025, 1, 9, 6, 0));
        let update = after_run(&s, RunTrigger::Scheduled, due, RunOutcome::Success, &policy(due));
        assert_eq!(update.next_run, at(2025, 1, 9, 6, 0));
    }

    #[test]
    fn test_plan_window_first_and_following_runs() {
        let due = at(2025, 1, 2, 6, 0);
        let first = plan_window(Frequency::Daily, RunTrigger::Scheduled, due, None, CatchupPolicy::Skip, due);
        assert_eq!(first.start, at(2025, 1, 1, 6, 0));
        assert_eq!(first.end, due);

        let follow = plan_window(
            Frequency::Daily,
            RunTrigger::Scheduled,
            due,
            Some(at(2025, 1, 1, 7, 30)),
            CatchupPolicy::Skip,
            due,
        );
        assert_eq!(follow.start, at(2025, 1, 1, 7, 30));
    }

    #[test]
    fn test_plan_window_catch_up() {
        let due = at(2025, 1, 2, 6, 0);
        let now = at(2025, 1, 5, 9, 0);
        let window = plan_window(Frequency::Daily, RunTrigger::Scheduled, due, None, CatchupPolicy::Skip, now);
        assert_eq!(window.start, at(2025, 1, 5, 6, 0));
        assert_eq!(window.end, now);

        let window = plan_window(Frequency::Daily, RunTrigger::Scheduled, due, None, CatchupPolicy::All, now);
        assert_eq!(window.end, due);
    }

    #[test]
    fn test_manual_transitions() {
        let now = at(2025, 1, 10, 12, 0);
        let mut s = schedule(Frequency::Daily, at(2025, 1, 2, 6, 0));
        pause(&mut s, now).unwrap();
        assert_eq!(s.status, ScheduleStatus::Paused);
        resume(&mut s, now);
        assert_eq!(s.status, ScheduleStatus::Active);
        assert_eq!(s.next_run, at(2025, 1, 11, 6, 0));

        s.status = ScheduleStatus::Failed;
        s.consecutive_failures = 3;
        assert!(pause(&mut s, now).is_err());
        reset(&mut s, now);
        assert_eq!(s.status, ScheduleStatus::Active);
        assert_eq!(s.consecutive_failures, 0);
    }

    #[test]
    fn test_lease_expiry_counts_failure_but_keeps_slot() {
        let due = at(2025, 1, 2, 6, 0);
        let mut s = schedule(Frequency::Daily, due);
        let update = after_lease_expiry(&s, &policy(at(2025, 1, 2, 6, 10)));
        assert_eq!(update.next_run, due);
        assert_eq!(update.consecutive_failures, 1);
        assert_eq!(update.status, ScheduleStatus::Active);

        s.consecutive_failures = 2;
        let update = after_lease_expiry(&s, &policy(at(2025, 1, 2, 6, 10)));
        assert_eq!(update.status, ScheduleStatus::Failed);
        assert_eq!(update.next_run, due);
    }
}
