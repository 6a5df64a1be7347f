//! `/api/v1/reports/runs/` handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::errors::ApiError;
use super::schedules::{parse_id, timestamp};
use super::AppState;
use crate::domain::models::{DeliveryResult, ReportRun};

#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactResponse {
    pub filename: String,
    pub mime_type: String,
}

/// Response with a run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub trigger: String,
    pub scheduled_for: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// `null` while the run is in flight.
    pub outcome: Option<String>,
    pub error_summary: Option<String>,
    pub artifact: Option<ArtifactResponse>,
    pub deliveries: Vec<DeliveryResult>,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
}

impl From<ReportRun> for RunResponse {
    fn from(r: ReportRun) -> Self {
        Self {
            id: r.id,
            schedule_id: r.schedule_id,
            trigger: r.trigger.as_str().to_string(),
            scheduled_for: timestamp(r.scheduled_for),
            started_at: timestamp(r.started_at),
            finished_at: r.finished_at.map(timestamp),
            outcome: r.outcome.map(|o| o.as_str().to_string()),
            error_summary: r.error_summary,
            artifact: r.artifact.map(|a| ArtifactResponse {
                filename: a.filename,
                mime_type: a.mime_type,
            }),
            deliveries: r.deliveries,
            window_start: r.window.map(|w| timestamp(w.start)),
            window_end: r.window.map(|w| timestamp(w.end)),
        }
    }
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let id = parse_id(&id, "Report run")?;
    Ok(Json(state.service.get_run(id).await?.into()))
}

pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "Report run")?;
    let (artifact, bytes) = state.service.artifact(id).await?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename.replace('"', ""));

    Ok((
        [
            (header::CONTENT_TYPE, artifact.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
