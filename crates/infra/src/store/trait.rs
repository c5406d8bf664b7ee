use std::sync::Arc;

use chrono::{DateTime, Utc};

use taskrelay_core::{Agent, AgentHello, AgentId, Job, JobId, JobStatus, NewJob, TaskingError};

/// Storage error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A compare-and-set precondition did not hold (the row changed underneath us).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for TaskingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => TaskingError::not_found(what),
            other => TaskingError::persistence(other.to_string()),
        }
    }
}

/// Job persistence contract.
///
/// Implementations must make [`JobStore::mark_sent`] and [`JobStore::update_job`]
/// atomic compare-and-set operations: concurrent callers racing on the same
/// row must never both observe success.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `Created` status and return it with its assigned id.
    async fn insert_job(&self, job: NewJob) -> Result<Job, StoreError>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// All jobs addressed to an agent, ordered by id.
    async fn jobs_for_agent(&self, agent_id: AgentId) -> Result<Vec<Job>, StoreError>;

    /// Overwrite status, output and error message of `job`, but only if the
    /// stored status still equals `expected`.
    ///
    /// Returns [`StoreError::Conflict`] when the status moved, and
    /// [`StoreError::NotFound`] when the row does not exist.
    async fn update_job(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError>;

    /// Move every listed job that is still pending to `Sent`.
    ///
    /// Returns exactly the ids this call transitioned; ids that were missing or
    /// already claimed are skipped. The whole batch commits or none of it does.
    async fn mark_sent(&self, ids: &[JobId]) -> Result<Vec<JobId>, StoreError>;
}

/// Agent registry persistence contract.
#[async_trait::async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError>;

    async fn get_agent_by_guid(&self, guid: &str) -> Result<Option<Agent>, StoreError>;

    /// Register the guid if unseen, otherwise check the existing agent in.
    ///
    /// Atomic on the guid: concurrent hellos for one guid yield one agent.
    async fn upsert_agent(&self, hello: &AgentHello, now: DateTime<Utc>)
        -> Result<Agent, StoreError>;
}

#[async_trait::async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn insert_job(&self, job: NewJob) -> Result<Job, StoreError> {
        (**self).insert_job(job).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).get_job(id).await
    }

    async fn jobs_for_agent(&self, agent_id: AgentId) -> Result<Vec<Job>, StoreError> {
        (**self).jobs_for_agent(agent_id).await
    }

    async fn update_job(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        (**self).update_job(job, expected).await
    }

    async fn mark_sent(&self, ids: &[JobId]) -> Result<Vec<JobId>, StoreError> {
        (**self).mark_sent(ids).await
    }
}

#[async_trait::async_trait]
impl<S> AgentStore for Arc<S>
where
    S: AgentStore + ?Sized,
{
    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        (**self).get_agent(id).await
    }

    async fn get_agent_by_guid(&self, guid: &str) -> Result<Option<Agent>, StoreError> {
        (**self).get_agent_by_guid(guid).await
    }

    async fn upsert_agent(
        &self,
        hello: &AgentHello,
        now: DateTime<Utc>,
    ) -> Result<Agent, StoreError> {
        (**self).upsert_agent(hello, now).await
    }
}
