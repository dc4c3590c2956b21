use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::json;

use crate::infra::{AppState, InMemoryPark, ScheduleOverview};
use parkpass::enrollment::{
    enrollment_router, ActivityCatalog, EnrollmentService, EnrollmentStore, VisitorDirectory,
};

/// Enrollment surface plus the operational endpoints and the read-only
/// catalog listing.
pub(crate) fn with_enrollment_routes<C, V, E>(
    service: Arc<EnrollmentService<C, V, E>>,
) -> axum::Router
where
    C: ActivityCatalog + 'static,
    V: VisitorDirectory + 'static,
    E: EnrollmentStore + 'static,
{
    enrollment_router(service)
        .route("/api/v1/schedules", axum::routing::get(schedules_endpoint))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn schedules_endpoint(
    Extension(park): Extension<Arc<InMemoryPark>>,
) -> Json<Vec<ScheduleOverview>> {
    Json(park.overview())
}
