//! Worker pool supervision: deadlines, panics, capacity and draining.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use texpro_reports::adapters::sqlite::SqliteReportScheduleRepository;
use texpro_reports::domain::models::{ClaimedRun, Frequency, RunOutcome, RunResult};
use texpro_reports::domain::ports::{Clock, ManualClock, ReportScheduleRepository};
use texpro_reports::services::{JobExecutor, RunRecorder, WorkerPool, WorkerPoolConfig};

use helpers::database::setup_test_db;
use helpers::fixtures::{at, options, schedule, test_config};

enum Behaviour {
    Succeed,
    Sleep(Duration),
    Panic,
    /// Wait for a permit from the gate before succeeding.
    Gate(Arc<Semaphore>),
}

struct ScriptedJob(Behaviour);

fn success() -> RunResult {
    RunResult {
        outcome: RunOutcome::Success,
        artifact: None,
        error_summary: None,
        deliveries: Vec::new(),
        window: None,
    }
}

#[async_trait]
impl JobExecutor for ScriptedJob {
    async fn execute(&self, _claim: &ClaimedRun) -> RunResult {
        match &self.0 {
            Behaviour::Succeed => success(),
            Behaviour::Sleep(d) => {
                tokio::time::sleep(*d).await;
                success()
            }
            Behaviour::Panic => panic!("boom"),
            Behaviour::Gate(gate) => {
                let _permit = gate.acquire().await.unwrap();
                success()
            }
        }
    }
}

struct Setup {
    repo: Arc<SqliteReportScheduleRepository>,
    pool: WorkerPool,
    claims: Vec<ClaimedRun>,
}

async fn setup(behaviour: Behaviour, capacity: usize, job_deadline: Duration, schedules: usize) -> Setup {
    let db = setup_test_db().await;
    let repo = Arc::new(SqliteReportScheduleRepository::new(db));
    let clock = Arc::new(ManualClock::new(at(2025, 1, 1, 12, 0)));

    for _ in 0..schedules {
        repo.create(&schedule(Frequency::Daily, at(2025, 1, 2, 6, 0), clock.now()))
            .await
            .unwrap();
    }
    clock.set(at(2025, 1, 2, 6, 0));
    let claims = repo
        .claim_due(clock.now(), schedules, &options("pool-test"))
        .await
        .unwrap();
    assert_eq!(claims.len(), schedules);

    let recorder = Arc::new(RunRecorder::new(repo.clone(), clock.clone(), &test_config()));
    let pool = WorkerPool::new(
        Arc::new(ScriptedJob(behaviour)),
        recorder,
        repo.clone(),
        clock,
        WorkerPoolConfig {
            capacity,
            job_deadline,
            lease_ttl: Duration::from_secs(120),
        },
        Arc::new(Notify::new()),
    );
    Setup { repo, pool, claims }
}

async fn outcome(repo: &SqliteReportScheduleRepository, run_id: Uuid) -> (Option<RunOutcome>, Option<String>) {
    let run = repo.get_run(run_id).await.unwrap().unwrap();
    (run.outcome, run.error_summary)
}

#[tokio::test]
async fn test_successful_job_is_recorded() {
    let s = setup(Behaviour::Succeed, 2, Duration::from_secs(5), 1).await;
    let claim = s.claims[0].clone();
    s.pool.submit(claim.clone());
    s.pool.wait_idle().await;

    assert_eq!(outcome(&s.repo, claim.run_id).await, (Some(RunOutcome::Success), None));
    let stored = s.repo.get(claim.schedule.id).await.unwrap().unwrap();
    assert_eq!(stored.next_run, at(2025, 1, 3, 6, 0));
    assert!(stored.lease.is_none());
}

#[tokio::test]
async fn test_deadline_exceeded_records_failure() {
    let s = setup(Behaviour::Sleep(Duration::from_secs(3600)), 1, Duration::from_millis(50), 1).await;
    let claim = s.claims[0].clone();
    s.pool.submit(claim.clone());
    s.pool.wait_idle().await;

    let (outcome, summary) = outcome(&s.repo, claim.run_id).await;
    assert_eq!(outcome, Some(RunOutcome::Failure));
    assert_eq!(summary.as_deref(), Some("deadline exceeded"));
    let stored = s.repo.get(claim.schedule.id).await.unwrap().unwrap();
    assert_eq!(stored.consecutive_failures, 1);
}

#[tokio::test]
async fn test_panicking_job_is_a_failure_not_a_crash() {
    let s = setup(Behaviour::Panic, 1, Duration::from_secs(5), 1).await;
    let claim = s.claims[0].clone();
    s.pool.submit(claim.clone());
    s.pool.wait_idle().await;

    let (outcome, summary) = outcome(&s.repo, claim.run_id).await;
    assert_eq!(outcome, Some(RunOutcome::Failure));
    assert_eq!(summary.as_deref(), Some("worker panicked: boom"));
    assert_eq!(s.pool.in_flight(), 0);
}

#[tokio::test]
async fn test_capacity_bounds_concurrent_jobs() {
    let gate = Arc::new(Semaphore::new(0));
    let s = setup(Behaviour::Gate(gate.clone()), 1, Duration::from_secs(5), 2).await;
    assert_eq!(s.pool.available(), 1);

    for claim in &s.claims {
        s.pool.submit(claim.clone());
    }
    assert_eq!(s.pool.in_flight(), 2);
    assert_eq!(s.pool.available(), 0);

    gate.add_permits(2);
    s.pool.wait_idle().await;
    assert_eq!(s.pool.available(), 1);
    for claim in &s.claims {
        assert_eq!(outcome(&s.repo, claim.run_id).await.0, Some(RunOutcome::Success));
    }
}

#[tokio::test]
async fn test_shutdown_lets_short_jobs_finish() {
    let s = setup(Behaviour::Sleep(Duration::from_millis(50)), 1, Duration::from_secs(5), 1).await;
    let claim = s.claims[0].clone();
    s.pool.submit(claim.clone());
    s.pool.shutdown(Duration::from_secs(2)).await;

    assert_eq!(outcome(&s.repo, claim.run_id).await.0, Some(RunOutcome::Success));
}

#[tokio::test]
async fn test_shutdown_cancels_jobs_past_the_drain_timeout() {
    let s = setup(Behaviour::Sleep(Duration::from_secs(3600)), 1, Duration::from_secs(3600), 1).await;
    let claim = s.claims[0].clone();
    s.pool.submit(claim.clone());
    s.pool.shutdown(Duration::from_millis(50)).await;

    assert_eq!(outcome(&s.repo, claim.run_id).await.0, Some(RunOutcome::Cancelled));
    let stored = s.repo.get(claim.schedule.id).await.unwrap().unwrap();
    assert_eq!(stored.next_run, at(2025, 1, 2, 6, 0));
    assert!(stored.lease.is_none());
}
