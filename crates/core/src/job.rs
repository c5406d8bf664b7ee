//! Job records and the shapes they take on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{TaskingError, TaskingResult};
use crate::id::{AgentId, JobId};

/// Lifecycle state of a job.
///
/// `Created → Sent → {Success | Failed | Cancelled}`, with an optional
/// `InProgress` report in between.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub enum JobStatus {
    #[default]
    Created,
    Sent,
    InProgress,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "Created",
            JobStatus::Sent => "Sent",
            JobStatus::InProgress => "InProgress",
            JobStatus::Success => "Success",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }

    /// Parse stored status text.
    ///
    /// Matching is case-insensitive. Missing or blank text reads as `Created`,
    /// which keeps rows written before a status was recorded eligible for delivery.
    pub fn parse_stored(raw: Option<&str>) -> TaskingResult<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(JobStatus::Created),
            Some(s) => s,
        };

        match raw.to_ascii_lowercase().as_str() {
            "created" => Ok(JobStatus::Created),
            "sent" => Ok(JobStatus::Sent),
            "inprogress" => Ok(JobStatus::InProgress),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(TaskingError::invalid_input(format!(
                "invalid job status '{raw}'; valid values are: Created, Sent, InProgress, Success, Failed, Cancelled"
            ))),
        }
    }

    /// Eligible for delivery to the owning agent.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Created)
    }

    /// No further lifecycle transition is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// States that carry agent-reported output.
    pub fn is_reported(&self) -> bool {
        matches!(self, JobStatus::InProgress) || self.is_terminal()
    }

    /// Position along the lifecycle graph; transitions never decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Created => 0,
            JobStatus::Sent => 1,
            JobStatus::InProgress => 2,
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled => 3,
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = TaskingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::parse_stored(Some(s))
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        JobStatus::parse_stored(raw.as_deref()).map_err(serde::de::Error::custom)
    }
}

/// A unit of work assigned to exactly one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "jobId")]
    pub id: JobId,
    pub job_type: String,
    /// Opaque payload, passed through untouched.
    pub job_data: JsonValue,
    #[serde(rename = "jobResultStatus", default)]
    pub status: JobStatus,
    /// Set only once a result has been ingested.
    #[serde(default)]
    pub job_output: Option<JsonValue>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub agent_id: AgentId,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Materialize a freshly submitted job once the store has assigned its id.
    pub fn from_new(id: JobId, new: NewJob) -> Self {
        Self {
            id,
            job_type: new.job_type,
            job_data: new.job_data,
            status: JobStatus::Created,
            job_output: None,
            error_message: None,
            agent_id: new.agent_id,
            created_at: new.created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// Project to the delivery payload handed to the polling agent.
    pub fn to_delivery(&self) -> JobDelivery {
        JobDelivery {
            id: self.id,
            job_type: self.job_type.clone(),
            job_data: self.job_data.clone(),
        }
    }
}

/// Job shape delivered to an agent on poll. Status and output are not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDelivery {
    #[serde(rename = "jobId")]
    pub id: JobId,
    pub job_type: String,
    pub job_data: JsonValue,
}

/// Unvalidated job submission as received from a submitter.
///
/// Every field is optional so that validation can report exactly what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCandidate {
    pub agent_id: Option<i64>,
    pub job_type: Option<String>,
    pub job_data: Option<JsonValue>,
}

impl JobCandidate {
    pub fn new(agent_id: i64, job_type: impl Into<String>, job_data: JsonValue) -> Self {
        Self {
            agent_id: Some(agent_id),
            job_type: Some(job_type.into()),
            job_data: Some(job_data),
        }
    }

    /// Validate in order, stopping at the first failure.
    pub fn validate(self, created_at: DateTime<Utc>) -> TaskingResult<NewJob> {
        let agent_id = match self.agent_id.map(AgentId::new) {
            Some(id) if id.is_valid() => id,
            _ => return Err(TaskingError::invalid_input("agent id required")),
        };

        let job_type = match self.job_type {
            Some(t) if !t.is_empty() => t,
            _ => return Err(TaskingError::invalid_input("job type required")),
        };

        let job_data = match self.job_data {
            Some(JsonValue::Null) | None => {
                return Err(TaskingError::invalid_input("job data required"));
            }
            Some(data) => data,
        };

        Ok(NewJob {
            agent_id,
            job_type,
            job_data,
            created_at,
        })
    }
}

/// A validated job awaiting identity assignment by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub agent_id: AgentId,
    pub job_type: String,
    pub job_data: JsonValue,
    pub created_at: DateTime<Utc>,
}
