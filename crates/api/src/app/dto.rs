use core::str::FromStr;

use axum::body::Bytes;
use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use taskrelay_core::{AgentId, JobCandidate, JobDelivery, TaskingError};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// `POST /api/tasking` envelope.
#[derive(Debug, Deserialize)]
pub struct TaskingRequest {
    #[serde(default)]
    pub jobs: Option<Vec<JobCandidate>>,
}

// -------------------------
// Response DTOs
// -------------------------

/// `GET /api/tasking/{agentId}` body.
#[derive(Debug, Serialize)]
pub struct TaskingResponse {
    pub jobs: Vec<JobDelivery>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloResponse {
    pub message: &'static str,
    pub agent_id: AgentId,
}

pub const HELLO_MESSAGE: &str = "Agent Hello Received";

// -------------------------
// Mapping helpers
// -------------------------

/// Decode an optional JSON body.
///
/// An empty body or a literal `null` is `None`, so the caller can answer with
/// its own "missing body" error. Anything that does not decode is a 400.
pub fn optional_json<T>(body: &Bytes) -> Result<Option<T>, axum::response::Response>
where
    T: DeserializeOwned,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_slice(body).map_err(malformed)?;
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(malformed)
}

/// Parse a path id, answering 400 when it is not an integer.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = TaskingError>,
{
    raw.parse::<T>().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id '{raw}'"),
        )
    })
}

fn malformed(err: serde_json::Error) -> axum::response::Response {
    errors::tasking_error_to_response(TaskingError::invalid_input(format!("malformed body: {err}")))
}
