//! Reports HTTP API.
//!
//! Serves the schedule and run endpoints under `/api/v1/reports/`. Identity
//! comes from headers set by the platform's auth layer in front of this
//! service.

pub mod auth;
pub mod errors;
pub mod runs;
pub mod schedules;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domain::models::ServerConfig;
use crate::services::report_schedule_service::ReportScheduleService;

pub use errors::{ApiError, ErrorResponse};

/// Shared state for the reports HTTP server.
pub struct AppState {
    pub service: Arc<ReportScheduleService>,
}

/// Build the router.
pub fn router(service: Arc<ReportScheduleService>) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route(
            "/api/v1/reports/schedules/",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/api/v1/reports/schedules/{id}/",
            get(schedules::get_schedule)
                .patch(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        .route("/api/v1/reports/schedules/{id}/run/", post(schedules::run_schedule))
        .route("/api/v1/reports/schedules/{id}/pause/", post(schedules::pause_schedule))
        .route("/api/v1/reports/schedules/{id}/resume/", post(schedules::resume_schedule))
        .route("/api/v1/reports/schedules/{id}/reset/", post(schedules::reset_schedule))
        .route("/api/v1/reports/schedules/{id}/runs/", get(schedules::list_runs))
        .route("/api/v1/reports/runs/{id}/", get(runs::get_run))
        .route("/api/v1/reports/runs/{id}/artifact/", get(runs::download_artifact))
        .route("/api/v1/reports/health/", get(health_check))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Reports HTTP server.
pub struct HttpServer {
    config: ServerConfig,
    service: Arc<ReportScheduleService>,
}

impl HttpServer {
    pub fn new(service: Arc<ReportScheduleService>, config: ServerConfig) -> Self {
        Self { config, service }
    }

    fn build_router(&self) -> Router {
        let app = router(self.service.clone());
        if self.config.enable_cors {
            app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(TraceLayer::new_for_http())
        } else {
            app.layer(TraceLayer::new_for_http())
        }
    }

    /// Start the server with a shutdown signal.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.build_router();

        tracing::info!("Reports HTTP server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
