//! Tracing and logging setup shared by the taskrelay binaries.

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}

/// Tracing configuration (filters, layers, spans).
pub mod tracing;

pub use self::tracing::{LogFormat, request_span};
