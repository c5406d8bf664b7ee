use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use taskrelay_core::AgentId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_tasking))
        .route("/:agent_id", get(poll))
}

/// Agent poll: deliver pending jobs and mark them sent.
pub async fn poll(
    Extension(services): Extension<Arc<AppServices>>,
    Path(agent_id): Path<String>,
) -> axum::response::Response {
    let agent_id: AgentId = match dto::parse_id(&agent_id, "agent") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.dispatcher.poll(agent_id).await {
        Ok(jobs) => Json(dto::TaskingResponse { jobs }).into_response(),
        Err(e) => errors::tasking_error_to_response(e),
    }
}

/// Multi-job task assignment.
pub async fn submit_tasking(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let request: Option<dto::TaskingRequest> = match dto::optional_json(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(candidates) = request.and_then(|r| r.jobs) else {
        return errors::tasking_error_to_response(taskrelay_core::TaskingError::invalid_input(
            "missing body",
        ));
    };

    match services.submission.submit_batch(candidates).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => errors::batch_error_to_response(e),
    }
}
