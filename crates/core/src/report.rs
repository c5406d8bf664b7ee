//! Outcomes reported by agents for previously dispatched jobs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::{TaskingError, TaskingResult};
use crate::job::JobStatus;

/// Status code carried by an agent's plugin result.
///
/// Agents may send either the numeric code or the name; names are matched
/// case-insensitively. Anything else is kept as `Unrecognized` so validation
/// can reject it with a precise message instead of failing body parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedStatus {
    Unknown,
    Success,
    Failed,
    InProgress,
    Cancelled,
    Unrecognized(String),
}

impl ReportedStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ReportedStatus::Unknown,
            1 => ReportedStatus::Success,
            2 => ReportedStatus::Failed,
            3 => ReportedStatus::InProgress,
            4 => ReportedStatus::Cancelled,
            other => ReportedStatus::Unrecognized(other.to_string()),
        }
    }

    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "unknown" => ReportedStatus::Unknown,
            "success" => ReportedStatus::Success,
            "failed" => ReportedStatus::Failed,
            "inprogress" => ReportedStatus::InProgress,
            "cancelled" => ReportedStatus::Cancelled,
            _ => ReportedStatus::Unrecognized(name.to_string()),
        }
    }

    /// The job status this report moves a job into, if it is a recognized outcome.
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            ReportedStatus::Success => Some(JobStatus::Success),
            ReportedStatus::Failed => Some(JobStatus::Failed),
            ReportedStatus::InProgress => Some(JobStatus::InProgress),
            ReportedStatus::Cancelled => Some(JobStatus::Cancelled),
            ReportedStatus::Unknown | ReportedStatus::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReportedStatus::Unknown => "Unknown",
            ReportedStatus::Success => "Success",
            ReportedStatus::Failed => "Failed",
            ReportedStatus::InProgress => "InProgress",
            ReportedStatus::Cancelled => "Cancelled",
            ReportedStatus::Unrecognized(raw) => raw,
        }
    }
}

impl Serialize for ReportedStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReportedStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => ReportedStatus::from_code(code),
            Raw::Name(name) => ReportedStatus::from_name(&name),
        })
    }
}

/// A plugin result reported by an agent for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    /// Agent-side correlation token; echoed in logs only.
    pub correlation_id: Option<u32>,
    pub status: Option<ReportedStatus>,
    pub output_data: Option<JsonValue>,
    pub error_message: Option<String>,
}

impl JobReport {
    pub fn new(status: ReportedStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, output: JsonValue) -> Self {
        self.output_data = Some(output);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Resolve the reported status to a job status, rejecting missing or unknown values.
    pub fn target_status(&self) -> TaskingResult<JobStatus> {
        let status = self
            .status
            .as_ref()
            .ok_or_else(|| TaskingError::invalid_input("result status required"))?;

        status.job_status().ok_or_else(|| {
            TaskingError::invalid_input(format!(
                "unrecognized result status '{}'; valid values are: Success, Failed, InProgress, Cancelled",
                status.as_str()
            ))
        })
    }
}
