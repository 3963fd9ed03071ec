//! Execution cache error types.

use strata_ports::StoreError;
use thiserror::Error;

/// Errors surfaced by the execution cache facade.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The caller did not supply a workflow id.
    #[error("workflow id is not set")]
    WorkflowIdNotSet,

    /// The caller supplied a run id that is not a well-formed UUID.
    #[error("run id is not a valid uuid: {0}")]
    InvalidRunId(String),

    /// The caller's cancellation scope fired before the operation
    /// completed (during current-run resolution or lock acquisition).
    #[error("operation cancelled")]
    Cancelled,

    /// The map refused an insert: every resident entry is pinned.
    #[error("execution cache capacity exhausted ({max_count} entries, all pinned)")]
    CapacityExhausted {
        /// The configured hard cap on resident entries.
        max_count: usize,
    },

    /// Storage failure during current-run resolution or state hydration,
    /// already passed through the retry executor.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CacheError {
    /// Whether this is a caller input error (not retryable).
    #[must_use]
    pub fn is_bad_input(&self) -> bool {
        matches!(self, Self::WorkflowIdNotSet | Self::InvalidRunId(_))
    }

    /// Whether the caller's cancellation scope ended the operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether retrying the whole operation could succeed.
    ///
    /// Delegates to the store classification; everything else is final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }
}
