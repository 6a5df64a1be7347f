//! Wiring of the scheduling runtime from its ports.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::domain::models::ReportsConfig;
use crate::domain::ports::{AnalyticsSource, ArtifactStore, Clock, Mailer, ReportScheduleRepository};
use crate::services::collector::Collector;
use crate::services::delivery::DeliveryService;
use crate::services::dispatcher::{claim_options, new_dispatcher_id, Dispatcher};
use crate::services::renderer::RendererRegistry;
use crate::services::report_job::ReportJob;
use crate::services::report_schedule_service::ReportScheduleService;
use crate::services::run_recorder::RunRecorder;
use crate::services::worker_pool::{JobExecutor, WorkerPool, WorkerPoolConfig};

/// Adapters the runtime is built from.
#[derive(Clone)]
pub struct RuntimePorts {
    pub repo: Arc<dyn ReportScheduleRepository>,
    pub analytics: Arc<dyn AnalyticsSource>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

/// One dispatcher, its worker pool and the schedule service sharing them.
pub struct ReportsRuntime {
    pub service: Arc<ReportScheduleService>,
    pub dispatcher: Arc<Dispatcher>,
    pub pool: Arc<WorkerPool>,
    pub job: Arc<ReportJob>,
    pub recorder: Arc<RunRecorder>,
}

impl ReportsRuntime {
    pub fn new(ports: RuntimePorts, config: &ReportsConfig) -> Self {
        Self::with_renderers(ports, config, RendererRegistry::new())
    }

    /// Build with a custom renderer registry.
    pub fn with_renderers(ports: RuntimePorts, config: &ReportsConfig, renderers: RendererRegistry) -> Self {
        let wake = Arc::new(Notify::new());
        let options = claim_options(new_dispatcher_id(), config);

        let job = Arc::new(ReportJob::new(
            Collector::new(ports.analytics.clone(), config.aggregator_deadline()),
            renderers,
            ports.artifacts.clone(),
            DeliveryService::new(ports.mailer.clone(), config.delivery_retries, config.delivery_backoff_base()),
            ports.clock.clone(),
            config.catchup_policy,
        ));
        let recorder = Arc::new(RunRecorder::new(ports.repo.clone(), ports.clock.clone(), config));
        let pool = Arc::new(WorkerPool::new(
            job.clone() as Arc<dyn JobExecutor>,
            recorder.clone(),
            ports.repo.clone(),
            ports.clock.clone(),
            WorkerPoolConfig::from(config),
            wake.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            ports.repo.clone(),
            pool.clone(),
            ports.clock.clone(),
            wake.clone(),
            options.clone(),
            config,
        ));
        let service = Arc::new(ReportScheduleService::new(
            ports.repo,
            ports.artifacts,
            pool.clone(),
            ports.clock,
            wake,
            options,
        ));

        Self {
            service,
            dispatcher,
            pool,
            job,
            recorder,
        }
    }
}
