//! Data collector.
//!
//! Runs the aggregator strategy for a report type against the analytics
//! source. Each aggregator call has its own deadline and a failing call only
//! costs its own section.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::domain::models::{Aggregator, CollectorWindow, ReportData, ReportType, Section, SectionFailure};
use crate::domain::ports::analytics::{AnalyticsError, AnalyticsSource};

pub struct Collector {
    source: Arc<dyn AnalyticsSource>,
    deadline: Duration,
}

impl Collector {
    pub fn new(source: Arc<dyn AnalyticsSource>, deadline: Duration) -> Self {
        Self { source, deadline }
    }

    /// Collect every section of `report_type` over `window`.
    ///
    /// Sections keep the strategy's order regardless of which call finishes first.
    pub async fn collect(
        &self,
        title: &str,
        report_type: ReportType,
        window: CollectorWindow,
        generated_at: DateTime<Utc>,
    ) -> ReportData {
        let aggregators = Aggregator::strategy_for(report_type);
        let calls = aggregators.iter().map(|&aggregator| self.call(aggregator, window));
        let results = join_all(calls).await;

        let mut data = ReportData {
            title: title.to_string(),
            window,
            generated_at,
            sections: Vec::with_capacity(aggregators.len()),
            failures: Vec::new(),
        };
        for (aggregator, result) in aggregators.iter().zip(results) {
            match result {
                Ok(section) => data.sections.push(section),
                Err(e) => {
                    tracing::warn!(aggregator = aggregator.as_str(), error = %e, "Aggregator failed");
                    data.failures.push(SectionFailure {
                        aggregator: *aggregator,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            report_type = report_type.as_str(),
            sections = data.sections.len(),
            failures = data.failures.len(),
            "Collected report data"
        );
        data
    }

    async fn call(
        &self,
        aggregator: Aggregator,
        window: CollectorWindow,
    ) -> Result<Section, AnalyticsError> {
        match tokio::time::timeout(self.deadline, self.source.aggregate(aggregator, &window)).await {
            Ok(result) => result,
            Err(_) => Err(AnalyticsError::Timeout {
                aggregator: aggregator.as_str(),
                seconds: self.deadline.as_secs(),
            }),
        }
    }
}
