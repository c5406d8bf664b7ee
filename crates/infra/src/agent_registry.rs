//! Agent hello handshake and lookup.

use chrono::Utc;
use tracing::{info, instrument, warn};

use taskrelay_core::{Agent, AgentHello, AgentId, TaskingError, TaskingResult};

use crate::store::AgentStore;

/// Registers agents on hello and refreshes their liveness on every repeat.
#[derive(Debug, Clone)]
pub struct AgentRegistry<S> {
    store: S,
}

impl<S> AgentRegistry<S>
where
    S: AgentStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Upsert the agent identified by `hello.agent_guid`.
    #[instrument(skip(self, hello), fields(agent_guid = hello.as_ref().map(|h| h.agent_guid.as_str())))]
    pub async fn hello(&self, hello: Option<AgentHello>) -> TaskingResult<Agent> {
        let hello = hello.ok_or_else(|| TaskingError::invalid_input("missing body"))?;
        hello.validate()?;

        let agent = self.store.upsert_agent(&hello, Utc::now()).await.map_err(|e| {
            warn!(error = %e, "failed to upsert agent");
            TaskingError::from(e)
        })?;

        info!(agent_id = %agent.id, "agent checked in");
        Ok(agent)
    }

    pub async fn get(&self, id: AgentId) -> TaskingResult<Agent> {
        self.store
            .get_agent(id)
            .await?
            .ok_or_else(|| TaskingError::not_found(format!("agent {id}")))
    }
}
