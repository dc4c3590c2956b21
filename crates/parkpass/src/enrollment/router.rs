use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ScheduleId, VisitorDraft, VisitorId, VisitorInput};
use super::repository::{ActivityCatalog, EnrollmentFilter, EnrollmentStore, VisitorDirectory};
use super::service::{EnrollmentError, EnrollmentService};

/// Router builder exposing the enrollment surface: batch enroll plus the
/// two read-only listings.
pub fn enrollment_router<C, V, E>(service: Arc<EnrollmentService<C, V, E>>) -> Router
where
    C: ActivityCatalog + 'static,
    V: VisitorDirectory + 'static,
    E: EnrollmentStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/enrollments",
            post(enroll_handler::<C, V, E>).get(list_handler::<C, V, E>),
        )
        .route(
            "/api/v1/enrollments/with-visitors",
            get(list_with_visitors_handler::<C, V, E>),
        )
        .with_state(service)
}

/// Wire shape of an enroll request.
#[derive(Debug, Deserialize)]
pub struct EnrollmentRequest {
    pub schedule_id: u64,
    pub visitors: Vec<VisitorPayload>,
    pub terms_accepted: bool,
}

/// Inbound visitor entry: either a reference to an existing visitor or the
/// full natural-key tuple used to resolve-or-create.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VisitorPayload {
    Reference {
        visitor_id: u64,
    },
    NaturalKey {
        national_id: u64,
        name: String,
        age: i64,
        #[serde(default)]
        size: Option<String>,
    },
}

impl From<VisitorPayload> for VisitorInput {
    fn from(payload: VisitorPayload) -> Self {
        match payload {
            VisitorPayload::Reference { visitor_id } => {
                VisitorInput::ByReference(VisitorId(visitor_id))
            }
            VisitorPayload::NaturalKey {
                national_id,
                name,
                age,
                size,
            } => VisitorInput::ByNaturalKey(VisitorDraft {
                name,
                national_id,
                age,
                size,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub schedule_id: Option<u64>,
}

impl ListParams {
    fn filter(&self) -> Option<EnrollmentFilter> {
        self.schedule_id.map(|id| EnrollmentFilter {
            schedule_id: Some(ScheduleId(id)),
        })
    }
}

pub(crate) async fn enroll_handler<C, V, E>(
    State(service): State<Arc<EnrollmentService<C, V, E>>>,
    axum::Json(request): axum::Json<EnrollmentRequest>,
) -> Response
where
    C: ActivityCatalog + 'static,
    V: VisitorDirectory + 'static,
    E: EnrollmentStore + 'static,
{
    let inputs = request.visitors.into_iter().map(VisitorInput::from).collect();

    let receipt = service
        .enroll(
            ScheduleId(request.schedule_id),
            inputs,
            request.terms_accepted,
        )
        .and_then(|rows| service.enriched(rows));

    match receipt {
        Ok(rows) => (StatusCode::CREATED, axum::Json(rows)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<C, V, E>(
    State(service): State<Arc<EnrollmentService<C, V, E>>>,
    Query(params): Query<ListParams>,
) -> Response
where
    C: ActivityCatalog + 'static,
    V: VisitorDirectory + 'static,
    E: EnrollmentStore + 'static,
{
    match service.list(params.filter()) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_with_visitors_handler<C, V, E>(
    State(service): State<Arc<EnrollmentService<C, V, E>>>,
    Query(params): Query<ListParams>,
) -> Response
where
    C: ActivityCatalog + 'static,
    V: VisitorDirectory + 'static,
    E: EnrollmentStore + 'static,
{
    match service.list_with_visitors(params.filter()) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Map the typed domain outcomes onto transport status codes; everything
/// infrastructural is an opaque 500.
fn error_response(error: EnrollmentError) -> Response {
    let status = match &error {
        EnrollmentError::ScheduleNotFound(_) | EnrollmentError::VisitorNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        EnrollmentError::DuplicateEnrollment { .. }
        | EnrollmentError::DuplicateNationalIdInBatch(_) => StatusCode::CONFLICT,
        EnrollmentError::InvalidVisitorData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EnrollmentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EnrollmentError::EmptyVisitorList
        | EnrollmentError::InactiveSchedule { .. }
        | EnrollmentError::TermsNotAccepted
        | EnrollmentError::InsufficientCapacity { .. }
        | EnrollmentError::SizeRequired { .. }
        | EnrollmentError::MinimumAgeNotMet { .. } => StatusCode::BAD_REQUEST,
    };

    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
