//! Execution addressing: the raw caller-supplied pair and the resolved key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{DomainId, RunId, WorkflowId};

/// The `(workflow_id, run_id)` pair as supplied by callers.
///
/// Both fields may be empty. An empty `run_id` is the "current run"
/// sentinel: the caller does not know which run is active and asks the
/// service to resolve it. This type is never used to index state — see
/// [`ExecutionKey`] for the resolved form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// The workflow identifier; must be non-empty for any operation.
    pub workflow_id: String,
    /// The run identifier; empty means "resolve the current run".
    pub run_id: String,
}

impl WorkflowExecution {
    /// Create an execution reference from raw parts.
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }

    /// Reference the current run of a workflow.
    pub fn current(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: String::new(),
        }
    }

    /// Whether the caller supplied a concrete run id.
    #[must_use]
    pub fn has_run_id(&self) -> bool {
        !self.run_id.is_empty()
    }
}

/// The fully-resolved address of one workflow run.
///
/// The run id is a parsed UUID by construction, so a key can never carry
/// the empty "current run" sentinel.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionKey {
    /// Owning tenant namespace.
    pub domain_id: DomainId,
    /// Workflow within the domain.
    pub workflow_id: WorkflowId,
    /// Concrete run of the workflow.
    pub run_id: RunId,
}

impl ExecutionKey {
    /// Assemble a key from its parts.
    pub fn new(
        domain_id: impl Into<DomainId>,
        workflow_id: impl Into<WorkflowId>,
        run_id: RunId,
    ) -> Self {
        Self {
            domain_id: domain_id.into(),
            workflow_id: workflow_id.into(),
            run_id,
        }
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.domain_id, self.workflow_id, self.run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_run_sentinel() {
        let exec = WorkflowExecution::current("order-wf");
        assert_eq!(exec.workflow_id, "order-wf");
        assert!(!exec.has_run_id());
    }

    #[test]
    fn concrete_run() {
        let exec = WorkflowExecution::new("order-wf", "550e8400-e29b-41d4-a716-446655440000");
        assert!(exec.has_run_id());
    }

    #[test]
    fn key_equality_and_hash() {
        use std::collections::HashSet;

        let run = RunId::v4();
        let a = ExecutionKey::new("d1", "w1", run);
        let b = ExecutionKey::new("d1", "w1", run);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn keys_differ_by_run() {
        let a = ExecutionKey::new("d1", "w1", RunId::v4());
        let b = ExecutionKey::new("d1", "w1", RunId::v4());
        assert_ne!(a, b);
    }

    #[test]
    fn display_joins_parts() {
        let run = RunId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = ExecutionKey::new("d1", "w1", run);
        assert_eq!(
            key.to_string(),
            "d1/w1/550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
