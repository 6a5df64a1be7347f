//! Mapping of domain errors onto HTTP responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::domain::errors::{DomainError, ValidationErrors};

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Domain(DomainError::Validation(ValidationErrors::single(
            "non_field_errors",
            rejection.body_text(),
        )))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Domain(DomainError::Validation(ValidationErrors::single(
            "non_field_errors",
            rejection.body_text(),
        )))
    }
}

fn error_body(status: StatusCode, code: &str, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(msg) => error_body(StatusCode::UNAUTHORIZED, "NOT_AUTHENTICATED", msg),
            Self::Forbidden(msg) => error_body(StatusCode::FORBIDDEN, "PERMISSION_DENIED", msg),
            Self::NotFound(msg) => error_body(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::Domain(err) => match err {
                DomainError::Validation(errors) => {
                    (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
                }
                DomainError::ScheduleNotFound(_)
                | DomainError::RunNotFound(_)
                | DomainError::ArtifactNotFound(_) => {
                    error_body(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                DomainError::Conflict(_) | DomainError::InvalidStateTransition { .. } => {
                    error_body(StatusCode::CONFLICT, "CONFLICT", err.to_string())
                }
                DomainError::StaleLease { .. }
                | DomainError::DatabaseError(_)
                | DomainError::SerializationError(_)
                | DomainError::ArtifactStorage(_) => {
                    tracing::error!(error = %err, "Request failed");
                    error_body(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal server error".to_string(),
                    )
                }
            },
        }
    }
}
