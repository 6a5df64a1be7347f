//! Analytics façade over the platform's operational data.
//!
//! Aggregators are treated as pure functions of the current database state
//! and the requested window.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{Aggregator, CollectorWindow, Section};

/// A single aggregator call failed; other sections may still succeed.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("aggregator '{aggregator}' exceeded its {seconds}s deadline")]
    Timeout { aggregator: &'static str, seconds: u64 },

    #[error("aggregator '{aggregator}' query failed: {message}")]
    Query {
        aggregator: &'static str,
        message: String,
    },

    #[error("analytics source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    /// Produce the section for `aggregator` over `[window.start, window.end)`.
    async fn aggregate(
        &self,
        aggregator: Aggregator,
        window: &CollectorWindow,
    ) -> Result<Section, AnalyticsError>;
}
