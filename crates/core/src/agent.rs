//! Registered remote agents and their hello handshake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TaskingError, TaskingResult};
use crate::id::AgentId;

/// Liveness state of an agent.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    Online,
    #[default]
    Offline,
    Idle,
    Busy,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "Online",
            AgentStatus::Offline => "Offline",
            AgentStatus::Idle => "Idle",
            AgentStatus::Busy => "Busy",
            AgentStatus::Error => "Error",
        }
    }
}

impl core::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AgentStatus {
    type Err = TaskingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(AgentStatus::Online),
            "" | "offline" => Ok(AgentStatus::Offline),
            "idle" => Ok(AgentStatus::Idle),
            "busy" => Ok(AgentStatus::Busy),
            "error" => Ok(AgentStatus::Error),
            other => Err(TaskingError::invalid_input(format!("invalid agent status '{other}'"))),
        }
    }
}

/// A registered remote worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(rename = "agentId")]
    pub id: AgentId,
    /// Stable identifier chosen by the agent itself; unique across agents.
    #[serde(rename = "agentGuid")]
    pub guid: String,
    #[serde(rename = "agentName")]
    pub name: String,
    pub status: AgentStatus,
    pub last_check_in: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub plugins: Vec<String>,
    pub version: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Agent {
    /// First registration of an agent that has never said hello before.
    pub fn register(id: AgentId, hello: &AgentHello, now: DateTime<Utc>) -> Self {
        let mut agent = Self {
            id,
            guid: hello.agent_guid.clone(),
            name: String::new(),
            status: AgentStatus::Online,
            last_check_in: Some(now),
            location: None,
            plugins: Vec::new(),
            version: None,
            registered_at: now,
            last_updated: now,
        };
        hello.merge_details(&mut agent);
        agent
    }

    /// Refresh liveness for a repeated hello from the same guid.
    pub fn check_in(&mut self, hello: &AgentHello, now: DateTime<Utc>) {
        self.status = AgentStatus::Online;
        self.last_check_in = Some(now);
        self.last_updated = now;
        hello.merge_details(self);
    }
}

/// Hello handshake body sent by an agent on startup and periodically afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHello {
    #[serde(default)]
    pub agent_guid: String,
    pub agent_name: Option<String>,
    pub location: Option<String>,
    pub plugins: Option<Vec<String>>,
    pub version: Option<String>,
}

impl AgentHello {
    pub fn new(agent_guid: impl Into<String>) -> Self {
        Self {
            agent_guid: agent_guid.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> TaskingResult<()> {
        if self.agent_guid.trim().is_empty() {
            return Err(TaskingError::invalid_input("agent guid required"));
        }
        Ok(())
    }

    /// Provided details overwrite stored ones; omitted details are left alone.
    fn merge_details(&self, agent: &mut Agent) {
        if let Some(name) = &self.agent_name {
            agent.name = name.clone();
        }
        if let Some(location) = &self.location {
            agent.location = Some(location.clone());
        }
        if let Some(plugins) = &self.plugins {
            agent.plugins = plugins.clone();
        }
        if let Some(version) = &self.version {
            agent.version = Some(version.clone());
        }
    }
}
