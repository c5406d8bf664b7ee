//! Job and agent storage.
//!
//! The tasking components never talk to a database directly; they consume the
//! [`JobStore`] / [`AgentStore`] contracts. Two backends ship here:
//!
//! - [`InMemoryStore`]: process-local, for tests/dev
//! - [`SqliteStore`]: durable, via sqlx

pub mod in_memory;
pub mod sqlite;
mod r#trait;

pub use in_memory::InMemoryStore;
pub use r#trait::{AgentStore, JobStore, StoreError};
pub use sqlite::SqliteStore;
