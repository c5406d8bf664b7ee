//! Infrastructure wiring: one store, shared by every tasking component.

use std::sync::Arc;

use tracing::info;

use taskrelay_core::{Job, JobId, LifecyclePolicy, TaskingResult};
use taskrelay_infra::{
    AgentRegistry, AgentStore, InMemoryStore, JobStore, JobSubmission, ResultIngester,
    SqliteStore, StoreError, TaskDispatcher,
};

use crate::config::{ApiConfig, StorageConfig};

pub type SharedJobStore = Arc<dyn JobStore>;
pub type SharedAgentStore = Arc<dyn AgentStore>;

/// Long-lived services handed to every handler.
pub struct AppServices {
    pub dispatcher: TaskDispatcher<SharedJobStore>,
    pub ingester: ResultIngester<SharedJobStore>,
    pub submission: JobSubmission<SharedJobStore>,
    pub agents: AgentRegistry<SharedAgentStore>,
    jobs: SharedJobStore,
    backend: &'static str,
}

impl AppServices {
    /// Wire all components over one store.
    pub fn new<S>(store: Arc<S>, policy: LifecyclePolicy) -> Self
    where
        S: JobStore + AgentStore + 'static,
    {
        Self::with_stores(store.clone(), store, policy, "custom")
    }

    /// Wire components over separate job and agent stores.
    pub fn with_stores(
        jobs: SharedJobStore,
        agents: SharedAgentStore,
        policy: LifecyclePolicy,
        backend: &'static str,
    ) -> Self {
        Self {
            dispatcher: TaskDispatcher::new(jobs.clone()),
            ingester: ResultIngester::new(jobs.clone(), policy),
            submission: JobSubmission::new(jobs.clone()),
            agents: AgentRegistry::new(agents),
            jobs,
            backend,
        }
    }

    pub fn in_memory(policy: LifecyclePolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_stores(store.clone(), store, policy, "memory")
    }

    pub async fn from_config(config: &ApiConfig) -> Result<Self, StoreError> {
        let services = match &config.storage {
            StorageConfig::InMemory => Self::in_memory(config.lifecycle),
            StorageConfig::Sqlite {
                url,
                max_connections,
            } => {
                let store = Arc::new(SqliteStore::connect(url, *max_connections).await?);
                Self::with_stores(store.clone(), store, config.lifecycle, "sqlite")
            }
        };

        info!(
            backend = services.backend,
            allow_terminal_overwrite = config.lifecycle.allow_terminal_overwrite,
            "services ready"
        );
        Ok(services)
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Direct job lookup; absence is not an error here.
    pub async fn job(&self, id: JobId) -> TaskingResult<Option<Job>> {
        Ok(self.jobs.get_job(id).await?)
    }
}
