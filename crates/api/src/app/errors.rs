use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use taskrelay_core::TaskingError;
use taskrelay_infra::BatchSubmitError;

pub fn tasking_error_status(err: &TaskingError) -> StatusCode {
    match err {
        TaskingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TaskingError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskingError::InvalidTransition { .. } => StatusCode::CONFLICT,
        TaskingError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn tasking_error_to_response(err: TaskingError) -> axum::response::Response {
    log_server_error(&err);
    json_error(tasking_error_status(&err), err.code(), error_message(&err))
}

/// Batch failures also say where the batch stopped and what was already created.
pub fn batch_error_to_response(err: BatchSubmitError) -> axum::response::Response {
    log_server_error(&err.source);
    (
        tasking_error_status(&err.source),
        axum::Json(json!({
            "error": err.source.code(),
            "message": error_message(&err.source),
            "index": err.index,
            "persisted": err.persisted_ids(),
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn error_message(err: &TaskingError) -> String {
    match err {
        TaskingError::InvalidInput(msg)
        | TaskingError::NotFound(msg)
        | TaskingError::Persistence(msg) => msg.clone(),
        TaskingError::InvalidTransition { .. } => err.to_string(),
    }
}

fn log_server_error(err: &TaskingError) {
    if let TaskingError::Persistence(msg) = err {
        tracing::error!(error = %msg, "store failure while handling request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrelay_core::JobStatus;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            tasking_error_status(&TaskingError::invalid_input("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(tasking_error_status(&TaskingError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            tasking_error_status(&TaskingError::invalid_transition(JobStatus::Success, JobStatus::InProgress)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            tasking_error_status(&TaskingError::persistence("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn transition_message_names_both_states() {
        let err = TaskingError::invalid_transition(JobStatus::Cancelled, JobStatus::InProgress);
        assert_eq!(error_message(&err), "invalid transition from Cancelled to InProgress");
    }
}
