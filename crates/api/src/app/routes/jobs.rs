use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use taskrelay_core::{JobCandidate, JobId, JobReport};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_job))
        .route("/:id", axum::routing::get(get_job).put(report_result))
        .route("/:id/result", post(report_result))
}

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let candidate: Option<JobCandidate> = match dto::optional_json(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.submission.submit(candidate).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => errors::tasking_error_to_response(e),
    }
}

/// Full job record; `204 No Content` when the id is unknown.
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match dto::parse_id(&id, "job") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.job(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::tasking_error_to_response(e),
    }
}

/// Agent result report (`PUT /api/job/{id}` and `POST /api/job/{id}/result`).
pub async fn report_result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let id: JobId = match dto::parse_id(&id, "job") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let report: Option<JobReport> = match dto::optional_json(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ingester.report(id, report).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => errors::tasking_error_to_response(e),
    }
}
