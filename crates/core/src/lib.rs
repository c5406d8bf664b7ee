//! `taskrelay-core`: job lifecycle domain building blocks.
//!
//! This crate contains **pure domain** types and rules (no infrastructure concerns).

pub mod agent;
pub mod error;
pub mod id;
pub mod job;
pub mod lifecycle;
pub mod report;

pub use agent::{Agent, AgentHello, AgentStatus};
pub use error::{TaskingError, TaskingResult};
pub use id::{AgentId, JobId};
pub use job::{Job, JobCandidate, JobDelivery, JobStatus, NewJob};
pub use lifecycle::{JobLifecycle, LifecyclePolicy};
pub use report::{JobReport, ReportedStatus};
