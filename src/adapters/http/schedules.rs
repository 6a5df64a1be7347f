//! `/api/v1/reports/schedules/` handlers.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{CurrentUser, ScheduleManager};
use super::errors::ApiError;
use super::runs::RunResponse;
use super::AppState;
use crate::domain::errors::{DomainError, ValidationErrors};
use crate::domain::models::{ReportSchedule, ReportType, ScheduleDraft, SchedulePatchDraft, ScheduleStatus};
use crate::domain::ports::report_schedule_repository::ReportScheduleFilter;
use crate::services::report_schedule_service::DEFAULT_RUN_HISTORY;

pub(super) fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(super) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("{what} not found: {raw}")))
}

/// Response with a schedule.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub id: Uuid,
    pub report_title: String,
    pub report_type: String,
    pub frequency: String,
    /// `null` for on-demand schedules.
    pub next_run: Option<String>,
    pub recipients: Vec<String>,
    pub format: String,
    pub status: String,
    pub site_code: Option<String>,
    pub consecutive_failures: u32,
    pub created_at: String,
    pub updated_at: String,
    pub created_by: Option<String>,
}

impl From<ReportSchedule> for ScheduleResponse {
    fn from(s: ReportSchedule) -> Self {
        Self {
            id: s.id,
            next_run: s.visible_next_run().map(timestamp),
            report_title: s.report_title,
            report_type: s.report_type.as_str().to_string(),
            frequency: s.frequency.as_str().to_string(),
            recipients: s.recipients.iter().cloned().collect(),
            format: s.format.as_str().to_string(),
            status: s.status.as_str().to_string(),
            site_code: s.site_code,
            consecutive_failures: s.consecutive_failures,
            created_at: timestamp(s.created_at),
            updated_at: timestamp(s.updated_at),
            created_by: s.created_by,
        }
    }
}

/// Query parameters for schedule listing.
#[derive(Debug, Deserialize)]
pub struct ScheduleQueryParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub report_type: Option<String>,
}

impl ScheduleQueryParams {
    fn into_filter(self) -> Result<ReportScheduleFilter, DomainError> {
        let mut errors = ValidationErrors::new();
        let status = self.status.filter(|s| !s.is_empty()).and_then(|s| {
            let parsed = ScheduleStatus::from_str(&s);
            if parsed.is_none() {
                errors.add("status", format!("Select a valid choice. {s} is not one of the available choices."));
            }
            parsed
        });
        let report_type = self.report_type.filter(|s| !s.is_empty()).and_then(|s| {
            let parsed = ReportType::from_str(&s);
            if parsed.is_none() {
                errors.add("report_type", format!("Select a valid choice. {s} is not one of the available choices."));
            }
            parsed
        });
        errors.into_result()?;
        Ok(ReportScheduleFilter { status, report_type })
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub soft: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RunHistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub run_id: Uuid,
}

pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
    params: Result<Query<ScheduleQueryParams>, QueryRejection>,
) -> Result<Json<Vec<ScheduleResponse>>, ApiError> {
    let Query(params) = params?;
    let schedules = state.service.list_schedules(params.into_filter()?).await?;
    Ok(Json(schedules.into_iter().map(ScheduleResponse::from).collect()))
}

pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    ScheduleManager(user): ScheduleManager,
    body: Result<Json<ScheduleDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<ScheduleResponse>), ApiError> {
    let Json(draft) = body?;
    let schedule = state.service.create_schedule(draft, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(schedule.into())))
}

pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    Ok(Json(state.service.get_schedule(id).await?.into()))
}

pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    ScheduleManager(_): ScheduleManager,
    Path(id): Path<String>,
    body: Result<Json<SchedulePatchDraft>, JsonRejection>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    let Json(draft) = body?;
    Ok(Json(state.service.update_schedule(id, draft).await?.into()))
}

pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    ScheduleManager(_): ScheduleManager,
    Path(id): Path<String>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    let Query(params) = params?;
    state.service.delete_schedule(id, params.soft.unwrap_or(true)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn run_schedule(
    State(state): State<Arc<AppState>>,
    ScheduleManager(_): ScheduleManager,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    let run_id = state.service.trigger_run(id).await?;
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { run_id })))
}

pub async fn pause_schedule(
    State(state): State<Arc<AppState>>,
    ScheduleManager(_): ScheduleManager,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    Ok(Json(state.service.pause_schedule(id).await?.into()))
}

pub async fn resume_schedule(
    State(state): State<Arc<AppState>>,
    ScheduleManager(_): ScheduleManager,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    Ok(Json(state.service.resume_schedule(id).await?.into()))
}

pub async fn reset_schedule(
    State(state): State<Arc<AppState>>,
    ScheduleManager(_): ScheduleManager,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    Ok(Json(state.service.reset_schedule(id).await?.into()))
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
    params: Result<Query<RunHistoryParams>, QueryRejection>,
) -> Result<Json<Vec<RunResponse>>, ApiError> {
    let id = parse_id(&id, "Report schedule")?;
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_RUN_HISTORY).clamp(1, 500);
    let runs = state.service.list_runs(id, limit).await?;
    Ok(Json(runs.into_iter().map(RunResponse::from).collect()))
}
