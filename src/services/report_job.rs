//! The report pipeline: plan window, collect, render, store, deliver.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::models::schedule_state::plan_window;
use crate::domain::models::{bound_error_summary, CatchupPolicy, ClaimedRun, RunOutcome, RunResult};
use crate::domain::ports::artifact_store::ArtifactStore;
use crate::domain::ports::clock::Clock;
use crate::services::collector::Collector;
use crate::services::delivery::DeliveryService;
use crate::services::renderer::RendererRegistry;
use crate::services::worker_pool::JobExecutor;

pub struct ReportJob {
    collector: Collector,
    renderers: RendererRegistry,
    artifacts: Arc<dyn ArtifactStore>,
    delivery: DeliveryService,
    clock: Arc<dyn Clock>,
    catchup: CatchupPolicy,
}

impl ReportJob {
    pub fn new(
        collector: Collector,
        renderers: RendererRegistry,
        artifacts: Arc<dyn ArtifactStore>,
        delivery: DeliveryService,
        clock: Arc<dyn Clock>,
        catchup: CatchupPolicy,
    ) -> Self {
        Self {
            collector,
            renderers,
            artifacts,
            delivery,
            clock,
            catchup,
        }
    }
}

#[async_trait]
impl JobExecutor for ReportJob {
    async fn execute(&self, claim: &ClaimedRun) -> RunResult {
        let schedule = &claim.schedule;
        let now = self.clock.now();
        let window = plan_window(
            schedule.frequency,
            claim.trigger,
            claim.scheduled_for,
            claim.previous_window_end,
            self.catchup,
            now,
        );
        tracing::info!(
            schedule_id = %schedule.id,
            run_id = %claim.run_id,
            window_start = %window.start,
            window_end = %window.end,
            "Running report"
        );

        let data = self
            .collector
            .collect(&schedule.report_title, schedule.report_type, window, now)
            .await;
        let outcome = data.outcome();
        if outcome == RunOutcome::Failure {
            let summary = data
                .failure_summary()
                .unwrap_or_else(|| "no sections collected".to_string());
            return RunResult::failure(summary).with_window(window);
        }

        let data = Arc::new(data);
        let rendered = match self.renderers.render(schedule.format, data.clone()).await {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!(schedule_id = %schedule.id, error = %e, "Rendering failed");
                return RunResult::failure(e.to_string()).with_window(window);
            }
        };

        let artifact = match self.artifacts.put(schedule.id, claim.run_id, &rendered).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!(schedule_id = %schedule.id, error = %e, "Storing artifact failed");
                return RunResult::failure(e.to_string()).with_window(window);
            }
        };

        let deliveries = self.delivery.deliver(schedule, &data, &rendered).await;

        RunResult {
            outcome,
            artifact: Some(artifact),
            error_summary: data.failure_summary().map(|s| bound_error_summary(&s)),
            deliveries,
            window: Some(window),
        }
    }
}
