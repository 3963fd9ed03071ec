//! Error taxonomy for store operations.
//!
//! Every port method returns `Result<_, StoreError>`. Backend drivers map
//! their internal failures into these variants so the history service can
//! make retry decisions without inspecting error messages.

use std::time::Duration;

/// Error type for all store operations.
///
/// [`is_retryable`](Self::is_retryable) separates the transient class
/// (connection loss, timeouts, backend pushback) from permanent failures
/// (missing records, corrupt payloads). Retry executors consult it; nothing
/// else should branch on variants by string.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record (e.g. "CurrentExecution", "ExecutionState").
        entity: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// Backend connection failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation exceeded its deadline.
    #[error("timeout: {operation} after {duration:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// How long was waited before giving up.
        duration: Duration,
    },

    /// Backend pushback (throttling, overload shedding).
    #[error("store busy: {0}")]
    Busy(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Convenience constructor for [`StoreError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Convenience constructor for [`StoreError::Timeout`].
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns `true` for transient errors that callers may retry.
    ///
    /// Currently [`Connection`](Self::Connection), [`Timeout`](Self::Timeout)
    /// and [`Busy`](Self::Busy).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::Busy(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
