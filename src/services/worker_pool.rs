//! Bounded worker pool for report jobs.
//!
//! Every submitted claim runs in its own task under a supervisor that
//! enforces the job deadline, keeps the lease alive, observes shutdown and
//! turns panics into failures. Whatever happens, the supervisor hands a
//! result to the [`RunRecorder`].

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::domain::models::{cadence, ClaimedRun, ReportsConfig, RunResult};
use crate::domain::ports::clock::Clock;
use crate::domain::ports::report_schedule_repository::ReportScheduleRepository;
use crate::services::run_recorder::RunRecorder;

/// Executes one claimed run end to end.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, claim: &ClaimedRun) -> RunResult;
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub capacity: usize,
    pub job_deadline: Duration,
    pub lease_ttl: Duration,
}

impl From<&ReportsConfig> for WorkerPoolConfig {
    fn from(config: &ReportsConfig) -> Self {
        Self {
            capacity: config.worker_capacity,
            job_deadline: config.job_deadline(),
            lease_ttl: config.lease_ttl(),
        }
    }
}

struct Shared {
    executor: Arc<dyn JobExecutor>,
    recorder: Arc<RunRecorder>,
    repo: Arc<dyn ReportScheduleRepository>,
    clock: Arc<dyn Clock>,
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    in_flight: watch::Sender<usize>,
    cancel: CancellationToken,
    /// Signalled whenever a job finishes so the dispatcher can claim again.
    wake: Arc<Notify>,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        recorder: Arc<RunRecorder>,
        repo: Arc<dyn ReportScheduleRepository>,
        clock: Arc<dyn Clock>,
        config: WorkerPoolConfig,
        wake: Arc<Notify>,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                executor,
                recorder,
                repo,
                clock,
                config,
                semaphore: Arc::new(Semaphore::new(config.capacity)),
                in_flight,
                cancel: CancellationToken::new(),
                wake,
            }),
            tracker: TaskTracker::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Jobs submitted and not yet recorded, including any waiting for a slot.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.borrow()
    }

    /// Free slots. The dispatcher never claims more than this.
    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.in_flight())
    }

    /// Run `claim` in the background.
    ///
    /// A claim submitted while the pool is full waits for a slot. Its lease
    /// is kept alive from the moment of submission.
    pub fn submit(&self, claim: ClaimedRun) {
        self.shared.in_flight.send_modify(|n| *n += 1);
        let shared = self.shared.clone();
        let span = tracing::info_span!("report_job", schedule_id = %claim.schedule.id, run_id = %claim.run_id);

        self.tracker.spawn(
            async move {
                let result = supervise(&shared, &claim).await;
                // StaleLease and store failures are logged by the recorder.
                let _ = shared.recorder.record(&claim, result).await;

                shared.in_flight.send_modify(|n| *n = n.saturating_sub(1));
                shared.wake.notify_one();
            }
            .instrument(span),
        );
    }

    /// Wait until every submitted job has been recorded.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting work, give running jobs `drain_timeout` to finish and
    /// cancel whatever is left. Cancelled runs are recorded as such.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.tracker.close();
        let in_flight = self.in_flight();
        if in_flight > 0 {
            tracing::info!(in_flight, ?drain_timeout, "Draining worker pool");
        }

        if tokio::time::timeout(drain_timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(in_flight = self.in_flight(), "Drain timeout elapsed; cancelling remaining jobs");
            self.shared.cancel.cancel();
            self.tracker.wait().await;
        }
        tracing::info!("Worker pool stopped");
    }
}

/// Run one claim to a terminal result.
async fn supervise(shared: &Shared, claim: &ClaimedRun) -> RunResult {
    let heartbeat_period = (shared.config.lease_ttl / 3).max(Duration::from_millis(10));
    let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Waiting for a slot counts toward neither the deadline nor the job.
    let permit = loop {
        tokio::select! {
            permit = shared.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => break permit,
                Err(_) => return RunResult::cancelled(),
            },
            () = shared.cancel.cancelled() => return RunResult::cancelled(),
            _ = heartbeat.tick() => {
                if !renew(shared, claim).await {
                    return RunResult::failure("lease lost");
                }
            }
        }
    };

    let executor = shared.executor.clone();
    let job_claim = claim.clone();
    let mut job = tokio::spawn(async move { executor.execute(&job_claim).await });
    let deadline = tokio::time::sleep(shared.config.job_deadline);
    tokio::pin!(deadline);

    let result = loop {
        tokio::select! {
            joined = &mut job => break joined.unwrap_or_else(join_failure),
            () = &mut deadline => {
                job.abort();
                tracing::warn!(schedule_id = %claim.schedule.id, run_id = %claim.run_id, "Job exceeded its deadline");
                break RunResult::failure("deadline exceeded");
            }
            () = shared.cancel.cancelled() => {
                job.abort();
                break RunResult::cancelled();
            }
            _ = heartbeat.tick() => {
                if !renew(shared, claim).await {
                    job.abort();
                    break RunResult::failure("lease lost");
                }
            }
        }
    };

    drop(permit);
    result
}

/// Extend the claim's lease. False only when another holder owns it now.
async fn renew(shared: &Shared, claim: &ClaimedRun) -> bool {
    let expires_at = chrono::Duration::from_std(shared.config.lease_ttl)
        .ok()
        .and_then(|ttl| shared.clock.now().checked_add_signed(ttl))
        .unwrap_or_else(cadence::never);
    match shared.repo.renew_lease(claim.schedule.id, &claim.lease_holder, expires_at).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(schedule_id = %claim.schedule.id, run_id = %claim.run_id, "Lease lost; abandoning job");
            false
        }
        Err(e) => {
            // Keep going; the lease may still be valid and finalize is fenced anyway.
            tracing::warn!(schedule_id = %claim.schedule.id, error = %e, "Lease renewal failed");
            true
        }
    }
}

fn join_failure(err: JoinError) -> RunResult {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        tracing::error!(panic = %message, "Report job panicked");
        RunResult::failure(format!("worker panicked: {message}"))
    } else {
        RunResult::failure(format!("worker aborted: {err}"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
