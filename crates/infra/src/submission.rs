//! Job submission: validate candidates and persist them as `Created` jobs.

use chrono::Utc;
use tracing::{info, instrument, warn};

use taskrelay_core::{Job, JobCandidate, JobId, TaskingError, TaskingResult};

use crate::store::JobStore;

/// A batch stopped at its first rejected candidate.
///
/// Earlier candidates were already persisted and stay persisted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("job at index {index} rejected: {source}")]
pub struct BatchSubmitError {
    pub index: usize,
    pub persisted: Vec<Job>,
    pub source: TaskingError,
}

impl BatchSubmitError {
    pub fn persisted_ids(&self) -> Vec<JobId> {
        self.persisted.iter().map(|job| job.id).collect()
    }
}

/// Accepts new jobs addressed to agents.
#[derive(Debug, Clone)]
pub struct JobSubmission<S> {
    store: S,
}

impl<S> JobSubmission<S>
where
    S: JobStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate and persist one job.
    ///
    /// Validation stops at the first failure: missing body, agent id, job type,
    /// job data. Nothing reaches the store unless all of them pass.
    #[instrument(skip(self, candidate))]
    pub async fn submit(&self, candidate: Option<JobCandidate>) -> TaskingResult<Job> {
        let candidate = candidate.ok_or_else(|| TaskingError::invalid_input("missing body"))?;
        let new_job = candidate.validate(Utc::now())?;

        let job = self.store.insert_job(new_job).await.map_err(|e| {
            warn!(error = %e, "failed to save job");
            TaskingError::from(e)
        })?;

        info!(job_id = %job.id, agent_id = %job.agent_id, job_type = %job.job_type, "job created");
        Ok(job)
    }

    /// Submit candidates in order, committing each one independently.
    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn submit_batch(
        &self,
        candidates: Vec<JobCandidate>,
    ) -> Result<Vec<Job>, BatchSubmitError> {
        let mut persisted = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.into_iter().enumerate() {
            match self.submit(Some(candidate)).await {
                Ok(job) => persisted.push(job),
                Err(source) => {
                    warn!(index, persisted = persisted.len(), error = %source, "batch submission stopped");
                    return Err(BatchSubmitError {
                        index,
                        persisted,
                        source,
                    });
                }
            }
        }

        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use serde_json::json;
    use taskrelay_core::JobStatus;

    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn submit_assigns_fresh_id_in_created() {
        let store = Arc::new(InMemoryStore::new());
        let submission = JobSubmission::new(store.clone());

        let job = submission
            .submit(Some(JobCandidate::new(7, "Ping", json!({"n": 1}))))
            .await
            .unwrap();
        assert_eq!(job.id, JobId::new(1));
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.job_output, None);

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.job_data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn invalid_candidates_never_reach_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let submission = JobSubmission::new(store.clone());

        assert_eq!(
            submission.submit(None).await.unwrap_err(),
            TaskingError::invalid_input("missing body")
        );
        assert_eq!(
            submission
                .submit(Some(JobCandidate::new(0, "Ping", json!({}))))
                .await
                .unwrap_err(),
            TaskingError::invalid_input("agent id required")
        );
        assert_eq!(store.job_count(), 0);
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let store = Arc::new(InMemoryStore::new());
        let submission = JobSubmission::new(store.clone());

        let mut seen = HashSet::new();
        for n in 0..20 {
            let job = submission
                .submit(Some(JobCandidate::new(1 + n % 3, "Ping", json!(n))))
                .await
                .unwrap();
            assert!(seen.insert(job.id), "id {} reused", job.id);
        }
    }

    #[tokio::test]
    async fn batch_keeps_items_before_first_failure() {
        let store = Arc::new(InMemoryStore::new());
        let submission = JobSubmission::new(store.clone());

        let err = submission
            .submit_batch(vec![
                JobCandidate::new(7, "Ping", json!(1)),
                JobCandidate::new(7, "Ping", json!(2)),
                JobCandidate::new(7, "", json!(3)),
                JobCandidate::new(7, "Ping", json!(4)),
            ])
            .await
            .unwrap_err();

        assert_eq!(err.index, 2);
        assert_eq!(err.source, TaskingError::invalid_input("job type required"));
        assert_eq!(err.persisted_ids(), vec![JobId::new(1), JobId::new(2)]);
        assert_eq!(store.job_count(), 2);
    }

    #[tokio::test]
    async fn batch_returns_all_created_jobs() {
        let store = Arc::new(InMemoryStore::new());
        let submission = JobSubmission::new(store);

        let jobs = submission
            .submit_batch(vec![
                JobCandidate::new(1, "Ping", json!({})),
                JobCandidate::new(2, "Scan", json!({"ports": [22, 80]})),
            ])
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Created));

        assert!(submission.submit_batch(Vec::new()).await.unwrap().is_empty());
    }
}
