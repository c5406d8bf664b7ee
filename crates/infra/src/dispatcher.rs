//! Pull-based task dispatch.
//!
//! An agent polls with its id and receives every job addressed to it that has
//! not been delivered yet. Delivery is at-most-once:
//!
//! ```text
//! poll(agent)
//!   ↓
//! 1. Load the agent's jobs (full scan by agent)
//!   ↓
//! 2. Keep the pending ones (status Created)
//!   ↓
//! 3. Claim them: JobStore::mark_sent, a compare-and-set Created → Sent
//!   ↓
//! 4. Return only the jobs this poll claimed
//! ```
//!
//! Two polls racing for the same agent may both see a job as pending in step 2,
//! but only one of them wins the claim in step 3, so their responses partition
//! the pending set. If the claim itself fails the poll fails and returns
//! nothing; a job is never returned without its `Sent` mark being durable.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use taskrelay_core::{AgentId, Job, JobDelivery, JobId, JobLifecycle, TaskingError, TaskingResult};

use crate::store::JobStore;

/// Hands pending jobs to polling agents.
#[derive(Debug, Clone)]
pub struct TaskDispatcher<S> {
    store: S,
}

impl<S> TaskDispatcher<S>
where
    S: JobStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Deliver the agent's pending jobs and mark them `Sent`.
    ///
    /// Always returns a (possibly empty) list; an unknown agent simply has no work.
    #[instrument(skip(self), fields(agent_id = %agent_id))]
    pub async fn poll(&self, agent_id: AgentId) -> TaskingResult<Vec<JobDelivery>> {
        if !agent_id.is_valid() {
            debug!("poll for non-positive agent id; nothing to deliver");
            return Ok(Vec::new());
        }

        let jobs = self.store.jobs_for_agent(agent_id).await.map_err(|e| {
            warn!(error = %e, "failed to load jobs for agent");
            TaskingError::from(e)
        })?;

        let pending: Vec<Job> = jobs
            .into_iter()
            .filter(|job| JobLifecycle::is_pending(job))
            .collect();

        if pending.is_empty() {
            debug!("no pending jobs");
            return Ok(Vec::new());
        }

        let ids: Vec<JobId> = pending.iter().map(|job| job.id).collect();
        let claimed: HashSet<JobId> = self
            .store
            .mark_sent(&ids)
            .await
            .map_err(|e| {
                warn!(error = %e, pending = ids.len(), "failed to mark jobs sent; delivering nothing");
                TaskingError::from(e)
            })?
            .into_iter()
            .collect();

        if claimed.len() < ids.len() {
            debug!(
                lost = ids.len() - claimed.len(),
                "jobs claimed by a concurrent poll"
            );
        }

        let deliveries: Vec<JobDelivery> = pending
            .iter()
            .filter(|job| claimed.contains(&job.id))
            .map(Job::to_delivery)
            .collect();

        info!(delivered = deliveries.len(), "dispatched jobs");
        Ok(deliveries)
    }
}
