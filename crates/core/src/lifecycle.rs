//! Job lifecycle rules.
//!
//! ```text
//! Created ──(dispatch)──▶ Sent ──(report)──▶ InProgress ──(report)──▶ Success | Failed | Cancelled
//!    └───────────────(report)──────────────────────────────────────────▲
//! ```
//!
//! Transitions never move a job backwards. `Sent` is entered only from
//! `Created`, and only by the dispatcher. Re-reporting a terminal job with
//! another terminal outcome is governed by [`LifecyclePolicy`].
//!
//! Everything here is a pure transformation over [`Job`] values.

use serde_json::Value as JsonValue;

use crate::error::{TaskingError, TaskingResult};
use crate::job::{Job, JobStatus};
use crate::report::JobReport;

/// Tunable lifecycle rules.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Allow a later terminal report to overwrite an earlier terminal outcome.
    pub allow_terminal_overwrite: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            allow_terminal_overwrite: true,
        }
    }
}

impl LifecyclePolicy {
    pub fn strict() -> Self {
        Self {
            allow_terminal_overwrite: false,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct JobLifecycle {
    policy: LifecyclePolicy,
}

impl JobLifecycle {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    /// Whether the dispatcher may deliver this job.
    pub fn is_pending(job: &Job) -> bool {
        job.status.is_pending()
    }

    /// Check a single status transition against the lifecycle graph.
    pub fn check_transition(&self, from: JobStatus, to: JobStatus) -> TaskingResult<()> {
        let allowed = match (from, to) {
            (_, JobStatus::Created) => false,
            (JobStatus::Created, JobStatus::Sent) => true,
            (_, JobStatus::Sent) => false,
            (f, t) if f.is_terminal() && t.is_terminal() => self.policy.allow_terminal_overwrite,
            (f, t) => t.rank() >= f.rank(),
        };

        if allowed {
            Ok(())
        } else {
            Err(TaskingError::invalid_transition(from, to))
        }
    }

    /// Produce the `Sent` version of a pending job.
    pub fn mark_sent(&self, job: &Job) -> TaskingResult<Job> {
        self.check_transition(job.status, JobStatus::Sent)?;
        let mut sent = job.clone();
        sent.status = JobStatus::Sent;
        Ok(sent)
    }

    /// Apply an agent-reported outcome, returning the updated record.
    ///
    /// Output is always recorded for reporting states; a report without output
    /// stores an explicit JSON `null`.
    pub fn apply_result(&self, job: &Job, report: &JobReport) -> TaskingResult<Job> {
        let target = report.target_status()?;
        self.check_transition(job.status, target)?;

        let mut updated = job.clone();
        updated.status = target;
        updated.job_output = Some(report.output_data.clone().unwrap_or(JsonValue::Null));
        updated.error_message = report.error_message.clone();
        Ok(updated)
    }
}
