//! Infrastructure layer: job/agent storage and the tasking orchestration built on it.

pub mod agent_registry;
pub mod dispatcher;
pub mod ingester;
pub mod store;
pub mod submission;

pub use agent_registry::AgentRegistry;
pub use dispatcher::TaskDispatcher;
pub use ingester::ResultIngester;
pub use store::{AgentStore, InMemoryStore, JobStore, SqliteStore, StoreError};
pub use submission::{BatchSubmitError, JobSubmission};
