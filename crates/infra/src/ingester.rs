//! Result ingestion: apply an agent-reported outcome to a dispatched job.

use tracing::{debug, info, instrument, warn};

use taskrelay_core::{Job, JobId, JobLifecycle, JobReport, LifecyclePolicy, TaskingError, TaskingResult};

use crate::store::{JobStore, StoreError};

/// Read/apply/write attempts before a report gives up on a contended job.
const MAX_ATTEMPTS: usize = 8;

/// Applies reported results through the lifecycle rules.
///
/// The write is a compare-and-set on the status that was read, so a report
/// never lands on a job that changed between read and write (for example one
/// the dispatcher was marking `Sent`). On conflict the job is re-read and the
/// report re-applied against the fresh state.
#[derive(Debug, Clone)]
pub struct ResultIngester<S> {
    store: S,
    lifecycle: JobLifecycle,
}

impl<S> ResultIngester<S>
where
    S: JobStore,
{
    pub fn new(store: S, policy: LifecyclePolicy) -> Self {
        Self {
            store,
            lifecycle: JobLifecycle::new(policy),
        }
    }

    pub fn lifecycle(&self) -> &JobLifecycle {
        &self.lifecycle
    }

    /// Record `report` against job `job_id` and return the updated job.
    #[instrument(
        skip(self, report),
        fields(
            job_id = %job_id,
            correlation_id = report.as_ref().and_then(|r| r.correlation_id)
        )
    )]
    pub async fn report(&self, job_id: JobId, report: Option<JobReport>) -> TaskingResult<Job> {
        let report = report.ok_or_else(|| TaskingError::invalid_input("missing body"))?;

        for attempt in 1..=MAX_ATTEMPTS {
            let current = self
                .store
                .get_job(job_id)
                .await
                .map_err(|e| {
                    warn!(error = %e, "failed to load job");
                    TaskingError::from(e)
                })?
                .ok_or_else(|| TaskingError::not_found(format!("job {job_id}")))?;

            let updated = self.lifecycle.apply_result(&current, &report)?;

            match self.store.update_job(&updated, current.status).await {
                Ok(()) => {
                    info!(from = %current.status, to = %updated.status, "recorded job result");
                    return Ok(updated);
                }
                Err(StoreError::Conflict(reason)) => {
                    debug!(attempt, %reason, "job changed concurrently; retrying");
                }
                Err(e) => {
                    warn!(error = %e, "failed to persist job result");
                    return Err(e.into());
                }
            }
        }

        Err(TaskingError::persistence(format!(
            "job {job_id} kept changing; gave up after {MAX_ATTEMPTS} attempts"
        )))
    }
}
