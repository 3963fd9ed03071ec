//! History store port.
//!
//! The durable side of the history service: which run is current for a
//! workflow, and the mutable-state snapshot of a specific run. Drivers
//! (Cassandra, SQL, in-memory for tests) implement this trait; the
//! execution cache and its contexts are written against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::{DomainId, ExecutionKey, RunId, WorkflowId};

use crate::error::StoreError;

/// Lookup request for the currently active run of a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCurrentExecutionRequest {
    /// Owning domain.
    pub domain_id: DomainId,
    /// Workflow whose current run is wanted.
    pub workflow_id: WorkflowId,
}

/// How a closed run ended, as recorded by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowCloseStatus {
    /// The run is still open.
    Open,
    /// Completed normally.
    Completed,
    /// Failed with an application error.
    Failed,
    /// Cancelled by a caller.
    Canceled,
    /// Terminated by an operator.
    Terminated,
    /// Timed out.
    TimedOut,
}

/// Response to a current-run lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCurrentExecutionResponse {
    /// The run the store considers current.
    pub run_id: RunId,
    /// Close status of that run.
    pub close_status: WorkflowCloseStatus,
}

/// A versioned mutable-state snapshot for one run.
///
/// The payload is opaque to the cache layer; the version supports
/// compare-and-swap updates by the transaction managers above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedState {
    /// Monotonic state version.
    pub version: u64,
    /// Opaque serialized mutable state.
    pub state: serde_json::Value,
}

/// Durable execution records of one shard.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Resolve the currently active run for `(domain_id, workflow_id)`.
    ///
    /// Returns [`StoreError::NotFound`] when the workflow has no current
    /// execution. Transient failures are reported via the retryable
    /// variants and retried by the caller, not here.
    async fn get_current_execution(
        &self,
        request: GetCurrentExecutionRequest,
    ) -> Result<GetCurrentExecutionResponse, StoreError>;

    /// Load the mutable-state snapshot for a specific run.
    async fn get_execution_state(&self, key: &ExecutionKey)
        -> Result<VersionedState, StoreError>;
}
