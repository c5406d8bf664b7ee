//! Process-local store backed by `RwLock`ed maps.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use taskrelay_core::{Agent, AgentHello, AgentId, Job, JobId, JobStatus, NewJob};

use super::r#trait::{AgentStore, JobStore, StoreError};

#[derive(Debug, Default)]
struct State {
    jobs: BTreeMap<JobId, Job>,
    last_job_id: i64,
    agents: BTreeMap<AgentId, Agent>,
    agents_by_guid: HashMap<String, AgentId>,
    last_agent_id: i64,
}

/// In-memory job and agent store.
///
/// All compare-and-set operations run under a single write lock, which makes
/// them atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.read().map(|s| s.jobs.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryStore {
    async fn insert_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let mut state = self.write()?;
        state.last_job_id += 1;
        let id = JobId::new(state.last_job_id);
        let job = Job::from_new(id, job);
        state.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    async fn jobs_for_agent(&self, agent_id: AgentId) -> Result<Vec<Job>, StoreError> {
        let state = self.read()?;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn update_job(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let stored = state
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job.id)))?;

        if stored.status != expected {
            return Err(StoreError::Conflict(format!(
                "job {} is {}, expected {}",
                job.id, stored.status, expected
            )));
        }

        stored.status = job.status;
        stored.job_output = job.job_output.clone();
        stored.error_message = job.error_message.clone();
        Ok(())
    }

    async fn mark_sent(&self, ids: &[JobId]) -> Result<Vec<JobId>, StoreError> {
        let mut state = self.write()?;
        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.status.is_pending() {
                    job.status = JobStatus::Sent;
                    claimed.push(*id);
                }
            }
        }
        Ok(claimed)
    }
}

#[async_trait::async_trait]
impl AgentStore for InMemoryStore {
    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        Ok(self.read()?.agents.get(&id).cloned())
    }

    async fn get_agent_by_guid(&self, guid: &str) -> Result<Option<Agent>, StoreError> {
        let state = self.read()?;
        Ok(state
            .agents_by_guid
            .get(guid)
            .and_then(|id| state.agents.get(id))
            .cloned())
    }

    async fn upsert_agent(
        &self,
        hello: &AgentHello,
        now: DateTime<Utc>,
    ) -> Result<Agent, StoreError> {
        let mut state = self.write()?;

        if let Some(id) = state.agents_by_guid.get(&hello.agent_guid).copied() {
            let agent = state
                .agents
                .get_mut(&id)
                .ok_or_else(|| StoreError::Backend(format!("guid index points at missing agent {id}")))?;
            agent.check_in(hello, now);
            return Ok(agent.clone());
        }

        state.last_agent_id += 1;
        let id = AgentId::new(state.last_agent_id);
        let agent = Agent::register(id, hello, now);
        state.agents_by_guid.insert(hello.agent_guid.clone(), id);
        state.agents.insert(id, agent.clone());
        Ok(agent)
    }
}
