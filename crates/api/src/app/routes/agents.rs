use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use taskrelay_core::{AgentHello, AgentId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/hello", post(hello))
        .route("/:id", get(get_agent))
}

/// Hello handshake: register or check in the agent, answer with its id.
pub async fn hello(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let hello: Option<AgentHello> = match dto::optional_json(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.agents.hello(hello).await {
        Ok(agent) => Json(dto::HelloResponse {
            message: dto::HELLO_MESSAGE,
            agent_id: agent.id,
        })
        .into_response(),
        Err(e) => errors::tasking_error_to_response(e),
    }
}

pub async fn get_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AgentId = match dto::parse_id(&id, "agent") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.agents.get(id).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => errors::tasking_error_to_response(e),
    }
}
