use axum::Router;

pub mod agents;
pub mod jobs;
pub mod system;
pub mod tasking;

/// Router for all agent- and submitter-facing endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/api/tasking", tasking::router())
        .nest("/api/job", jobs::router())
        .nest("/api/agent", agents::router())
}
