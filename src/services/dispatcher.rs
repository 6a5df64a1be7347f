//! Dispatcher loop.
//!
//! Sleeps until the next schedule is due (or a tick passes, or something
//! wakes it), claims as many due schedules as the worker pool has free
//! slots and hands them over. Several dispatchers may share one database;
//! leases keep them from running the same schedule twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ReportsConfig;
use crate::domain::ports::clock::Clock;
use crate::domain::ports::report_schedule_repository::{ClaimOptions, ReportScheduleRepository};
use crate::services::worker_pool::WorkerPool;

/// Upper bound on the store error backoff.
const MAX_STORE_BACKOFF: Duration = Duration::from_secs(300);

/// Floor on the idle sleep when something is already due.
const MIN_SLEEP: Duration = Duration::from_millis(100);

/// A process-unique dispatcher id, used as the lease holder prefix.
pub fn new_dispatcher_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("dispatcher-{}-{}", std::process::id(), &suffix[..8])
}

/// Lease parameters shared by scheduled and manual claims.
pub fn claim_options(dispatcher_id: String, config: &ReportsConfig) -> ClaimOptions {
    ClaimOptions {
        dispatcher_id,
        lease_ttl: chrono::Duration::from_std(config.lease_ttl())
            .unwrap_or_else(|_| chrono::Duration::seconds(120)),
        failure_limit: config.failure_limit,
        catchup: config.catchup_policy,
    }
}

/// `tick × 2ⁿ`, capped at five minutes.
pub fn store_backoff(tick: Duration, consecutive_errors: u32) -> Duration {
    let factor = 2_u32.saturating_pow(consecutive_errors.min(16));
    tick.saturating_mul(factor).min(MAX_STORE_BACKOFF)
}

pub struct Dispatcher {
    repo: Arc<dyn ReportScheduleRepository>,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
    options: ClaimOptions,
    tick: Duration,
    drain_timeout: Duration,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn ReportScheduleRepository>,
        pool: Arc<WorkerPool>,
        clock: Arc<dyn Clock>,
        wake: Arc<Notify>,
        options: ClaimOptions,
        config: &ReportsConfig,
    ) -> Self {
        Self {
            repo,
            pool,
            clock,
            wake,
            options,
            tick: config.tick_interval(),
            drain_timeout: config.drain_timeout(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn dispatcher_id(&self) -> &str {
        &self.options.dispatcher_id
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Claim due schedules up to the pool's free capacity and submit them.
    pub async fn dispatch_once(&self) -> DomainResult<usize> {
        let available = self.pool.available();
        if available == 0 {
            return Ok(0);
        }

        let claims = self.repo.claim_due(self.clock.now(), available, &self.options).await?;
        let claimed = claims.len();
        for claim in claims {
            tracing::info!(
                schedule_id = %claim.schedule.id,
                run_id = %claim.run_id,
                scheduled_for = %claim.scheduled_for,
                "Claimed due schedule"
            );
            self.pool.submit(claim);
        }
        Ok(claimed)
    }

    /// How long to sleep before the next claim attempt.
    async fn idle_sleep(&self) -> DomainResult<Duration> {
        if self.pool.available() == 0 {
            return Ok(self.tick);
        }
        let Some(next_due) = self.repo.next_due_at().await? else {
            return Ok(self.tick);
        };
        let until_due = (next_due - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        Ok(until_due.clamp(MIN_SLEEP, self.tick.max(MIN_SLEEP)))
    }

    /// Run until the shutdown token is cancelled, then drain the pool.
    pub async fn run(&self) {
        tracing::info!(
            dispatcher_id = %self.options.dispatcher_id,
            capacity = self.pool.capacity(),
            tick = ?self.tick,
            "Dispatcher started"
        );
        let mut consecutive_errors = 0_u32;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let attempt = match self.dispatch_once().await {
                Ok(_) => self.idle_sleep().await,
                Err(e) => Err(e),
            };
            let sleep_for = match attempt {
                Ok(sleep_for) => {
                    consecutive_errors = 0;
                    sleep_for
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let backoff = store_backoff(self.tick, consecutive_errors);
                    tracing::error!(error = %e, consecutive_errors, ?backoff, "Dispatcher store error; backing off");
                    backoff
                }
            };

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                () = tokio::time::sleep(sleep_for) => {}
            }
        }

        tracing::info!(dispatcher_id = %self.options.dispatcher_id, "Dispatcher stopping");
        self.pool.shutdown(self.drain_timeout).await;
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}
