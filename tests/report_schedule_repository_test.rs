mod helpers;

use chrono::Duration;
use texpro_reports::adapters::sqlite::report_schedule_repository::LEASE_EXPIRED_SUMMARY;
use texpro_reports::adapters::sqlite::SqliteReportScheduleRepository;
use texpro_reports::domain::errors::DomainError;
use texpro_reports::domain::models::{
    CatchupPolicy, FinalizePolicy, Frequency, RunOutcome, RunResult, RunTrigger, ScheduleStatus,
};
use texpro_reports::domain::ports::{DeleteOutcome, ReportScheduleFilter, ReportScheduleRepository};

use helpers::database::{setup_file_db, setup_test_db, teardown_test_db};
use helpers::fixtures::{at, options, schedule};

fn success() -> RunResult {
    RunResult {
        outcome: RunOutcome::Success,
        artifact: None,
        error_summary: None,
        deliveries: Vec::new(),
        window: None,
    }
}

fn policy(now: chrono::DateTime<chrono::Utc>) -> FinalizePolicy {
    FinalizePolicy {
        failure_limit: 3,
        catchup: CatchupPolicy::Skip,
        now,
    }
}

#[tokio::test]
async fn test_claim_due_takes_only_due_active_schedules() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let created = at(2025, 1, 1, 0, 0);
    let now = at(2025, 1, 2, 6, 0);

    let due = schedule(Frequency::Daily, now, created);
    let later = schedule(Frequency::Daily, now + Duration::hours(1), created);
    let mut paused = schedule(Frequency::Daily, now - Duration::hours(1), created);
    paused.status = ScheduleStatus::Paused;
    for s in [&due, &later, &paused] {
        repo.create(s).await.unwrap();
    }

    let claims = repo.claim_due(now, 10, &options("d1")).await.unwrap();
    assert_eq!(claims.len(), 1);
    let claim = &claims[0];
    assert_eq!(claim.schedule.id, due.id);
    assert_eq!(claim.trigger, RunTrigger::Scheduled);
    assert_eq!(claim.scheduled_for, now);
    assert!(claim.lease_holder.starts_with("d1/"));

    let stored = repo.get(due.id).await.unwrap().unwrap();
    assert_eq!(stored.lease.unwrap().holder, claim.lease_holder);
    let run = repo.get_run(claim.run_id).await.unwrap().unwrap();
    assert!(run.is_in_flight());

    // Leased schedules are not claimable again.
    assert!(repo.claim_due(now, 10, &options("d2")).await.unwrap().is_empty());
    assert_eq!(repo.next_due_at().await.unwrap(), Some(later.next_run));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_finalize_advances_next_run_and_releases_lease() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let now = at(2025, 1, 2, 6, 0);
    let s = schedule(Frequency::Daily, now, at(2025, 1, 1, 0, 0));
    repo.create(&s).await.unwrap();

    let claim = repo.claim_due(now, 1, &options("d1")).await.unwrap().remove(0);
    let finished_at = now + Duration::minutes(2);
    let finalized = repo.finalize_run(&claim, &success(), &policy(finished_at)).await.unwrap();

    let update = finalized.schedule_update.unwrap();
    assert_eq!(update.next_run, at(2025, 1, 3, 6, 0));
    assert_eq!(finalized.run.outcome, Some(RunOutcome::Success));

    let stored = repo.get(s.id).await.unwrap().unwrap();
    assert!(stored.lease.is_none());
    assert_eq!(stored.next_run, at(2025, 1, 3, 6, 0));
    let latest = repo.latest_finished_run(s.id).await.unwrap().unwrap();
    assert_eq!(latest.id, claim.run_id);
    assert_eq!(latest.finished_at, Some(finished_at));

    // A second finalize of the same claim is rejected.
    let again = repo.finalize_run(&claim, &success(), &policy(finished_at)).await;
    assert!(matches!(again, Err(DomainError::StaleLease { .. })));
}

#[tokio::test]
async fn test_expired_lease_fails_orphan_and_slot_is_reclaimed() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let now = at(2025, 1, 2, 6, 0);
    let s = schedule(Frequency::Daily, now, at(2025, 1, 1, 0, 0));
    repo.create(&s).await.unwrap();

    let claim = repo.claim_due(now, 1, &options("d1")).await.unwrap().remove(0);

    // d1 is gone; another dispatcher arrives after the lease ran out and
    // takes over the same slot.
    let later = now + Duration::minutes(10);
    let mut reclaimed = repo.claim_due(later, 10, &options("d2")).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    let retry = reclaimed.remove(0);
    assert_eq!(retry.schedule.id, s.id);
    assert_eq!(retry.scheduled_for, now);
    assert!(retry.lease_holder.starts_with("d2/"));
    assert_ne!(retry.run_id, claim.run_id);

    let orphan = repo.get_run(claim.run_id).await.unwrap().unwrap();
    assert_eq!(orphan.outcome, Some(RunOutcome::Failure));
    assert_eq!(orphan.error_summary.as_deref(), Some(LEASE_EXPIRED_SUMMARY));

    let stored = repo.get(s.id).await.unwrap().unwrap();
    assert_eq!(stored.consecutive_failures, 1);
    assert_eq!(stored.next_run, now);
    assert_eq!(stored.lease.unwrap().holder, retry.lease_holder);

    // The crashed holder can no longer finalize.
    let late = repo.finalize_run(&claim, &success(), &policy(later)).await;
    assert!(matches!(late, Err(DomainError::StaleLease { .. })));
    assert_eq!(repo.get(s.id).await.unwrap().unwrap().consecutive_failures, 1);

    // The retry completes the slot and moves the schedule on.
    let finalized = repo.finalize_run(&retry, &success(), &policy(later)).await.unwrap();
    let update = finalized.schedule_update.unwrap();
    assert_eq!(update.next_run, at(2025, 1, 3, 6, 0));
    assert_eq!(update.consecutive_failures, 0);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_repeated_lease_expiry_reaches_failure_limit() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let now = at(2025, 1, 2, 6, 0);
    let s = schedule(Frequency::Daily, now, at(2025, 1, 1, 0, 0));
    repo.create(&s).await.unwrap();

    // Every holder dies; each takeover records one more failure.
    let mut tick = now;
    for _ in 0..3 {
        repo.claim_due(tick, 1, &options("d1")).await.unwrap();
        tick += Duration::minutes(10);
    }
    assert!(repo.claim_due(tick, 1, &options("d1")).await.unwrap().is_empty());

    let stored = repo.get(s.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScheduleStatus::Failed);
    assert_eq!(stored.consecutive_failures, 3);
    assert_eq!(stored.next_run, now);
    assert!(stored.lease.is_none());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_renew_lease_only_for_current_holder() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let now = at(2025, 1, 2, 6, 0);
    let s = schedule(Frequency::Daily, now, at(2025, 1, 1, 0, 0));
    repo.create(&s).await.unwrap();

    let claim = repo.claim_due(now, 1, &options("d1")).await.unwrap().remove(0);
    let extended = now + Duration::minutes(10);
    assert!(repo.renew_lease(s.id, &claim.lease_holder, extended).await.unwrap());
    assert!(!repo.renew_lease(s.id, "d2/other", extended).await.unwrap());

    // The renewed lease survives a claim attempt past the original expiry.
    assert!(repo.claim_due(now + Duration::minutes(5), 1, &options("d2")).await.unwrap().is_empty());
    assert!(repo.get_run(claim.run_id).await.unwrap().unwrap().is_in_flight());
}

#[tokio::test]
async fn test_manual_claim_conflicts_and_keeps_phase() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let now = at(2025, 1, 2, 3, 0);
    let next_run = at(2025, 1, 2, 6, 0);
    let s = schedule(Frequency::Daily, next_run, at(2025, 1, 1, 0, 0));
    repo.create(&s).await.unwrap();

    let claim = repo.claim_one(s.id, now, &options("d1")).await.unwrap();
    assert_eq!(claim.trigger, RunTrigger::Manual);
    assert!(matches!(
        repo.claim_one(s.id, now, &options("d1")).await,
        Err(DomainError::Conflict(_))
    ));

    let finalized = repo.finalize_run(&claim, &success(), &policy(now)).await.unwrap();
    assert_eq!(finalized.schedule_update.unwrap().next_run, next_run);
}

#[tokio::test]
async fn test_update_is_fenced_on_updated_at() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let created = at(2025, 1, 1, 0, 0);
    let s = schedule(Frequency::Weekly, at(2025, 1, 6, 6, 0), created);
    repo.create(&s).await.unwrap();

    let mut first = s.clone();
    first.report_title = "Weekly Output".to_string();
    first.updated_at = created + Duration::seconds(1);
    repo.update(&first, created).await.unwrap();

    let mut second = s.clone();
    second.report_title = "Lost Update".to_string();
    second.updated_at = created + Duration::seconds(2);
    assert!(matches!(repo.update(&second, created).await, Err(DomainError::Conflict(_))));

    assert_eq!(repo.get(s.id).await.unwrap().unwrap().report_title, "Weekly Output");
}

#[tokio::test]
async fn test_delete_hard_soft_and_purge_on_finalize() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let now = at(2025, 1, 2, 6, 0);
    let idle = schedule(Frequency::Daily, now + Duration::days(1), at(2025, 1, 1, 0, 0));
    let busy = schedule(Frequency::Daily, now, at(2025, 1, 1, 0, 0));
    repo.create(&idle).await.unwrap();
    repo.create(&busy).await.unwrap();

    assert_eq!(repo.delete(idle.id, false).await.unwrap(), DeleteOutcome::Removed);
    assert!(matches!(repo.delete(idle.id, true).await, Err(DomainError::ScheduleNotFound(_))));

    let claim = repo.claim_due(now, 1, &options("d1")).await.unwrap().remove(0);
    assert!(matches!(repo.delete(busy.id, false).await, Err(DomainError::Conflict(_))));
    assert_eq!(repo.delete(busy.id, true).await.unwrap(), DeleteOutcome::Deferred);

    assert!(repo.get(busy.id).await.unwrap().is_none());
    assert!(repo.list(ReportScheduleFilter::default()).await.unwrap().is_empty());

    let finalized = repo.finalize_run(&claim, &success(), &policy(now)).await.unwrap();
    assert!(finalized.schedule_update.is_none());
    assert!(repo.get_run(claim.run_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_filters_by_status_and_type() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let created = at(2025, 1, 1, 0, 0);
    let active = schedule(Frequency::Daily, at(2025, 1, 2, 6, 0), created);
    let mut failed = schedule(Frequency::Monthly, at(2025, 2, 1, 6, 0), created + Duration::seconds(1));
    failed.status = ScheduleStatus::Failed;
    repo.create(&active).await.unwrap();
    repo.create(&failed).await.unwrap();

    let all = repo.list(ReportScheduleFilter::default()).await.unwrap();
    assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![active.id, failed.id]);

    let only_failed = repo
        .list(ReportScheduleFilter {
            status: Some(ScheduleStatus::Failed),
            report_type: None,
        })
        .await
        .unwrap();
    assert_eq!(only_failed.len(), 1);
    assert_eq!(only_failed[0].id, failed.id);
}

#[tokio::test]
async fn test_two_dispatchers_race_for_one_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.db");
    let pool_a = setup_file_db(&path).await;
    let pool_b = setup_file_db(&path).await;
    let repo_a = SqliteReportScheduleRepository::new(pool_a.clone());
    let repo_b = SqliteReportScheduleRepository::new(pool_b.clone());

    let now = at(2025, 1, 2, 6, 0);
    let s = schedule(Frequency::Daily, now, at(2025, 1, 1, 0, 0));
    repo_a.create(&s).await.unwrap();

    let (opts_a, opts_b) = (options("dispatcher-a"), options("dispatcher-b"));
    let (a, b) = tokio::join!(repo_a.claim_due(now, 4, &opts_a), repo_b.claim_due(now, 4, &opts_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.len() + b.len(), 1, "exactly one dispatcher wins the claim");
    assert_eq!(repo_a.list_runs(s.id, 10).await.unwrap().len(), 1);

    teardown_test_db(pool_a).await;
    teardown_test_db(pool_b).await;
}

#[tokio::test]
async fn test_next_claim_continues_from_previous_window() {
    let pool = setup_test_db().await;
    let repo = SqliteReportScheduleRepository::new(pool.clone());
    let first = at(2025, 1, 2, 6, 0);
    let s = schedule(Frequency::Daily, first, at(2025, 1, 1, 0, 0));
    repo.create(&s).await.unwrap();
    assert!(repo.latest_finished_run(s.id).await.unwrap().is_none());

    let claim = repo.claim_due(first, 1, &options("d1")).await.unwrap().remove(0);
    assert_eq!(claim.previous_window_end, None);
    let window = texpro_reports::domain::models::CollectorWindow {
        start: first - Duration::days(1),
        end: first,
    };
    let result = success().with_window(window);
    repo.finalize_run(&claim, &result, &policy(first + Duration::minutes(1))).await.unwrap();

    let latest = repo.latest_finished_run(s.id).await.unwrap().unwrap();
    assert_eq!(latest.id, claim.run_id);
    assert_eq!(latest.window, Some(window));

    let second = at(2025, 1, 3, 6, 0);
    let next = repo.claim_due(second, 1, &options("d1")).await.unwrap().remove(0);
    assert_eq!(next.previous_window_end, Some(first));

    teardown_test_db(pool).await;
}
