#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Strata Core
//!
//! Identifier and key types shared across the Strata history service.
//!
//! A workflow run is addressed by the triple `(domain, workflow, run)`:
//!
//! - [`DomainId`] — the tenant namespace owning the workflow
//! - [`WorkflowId`] — the logical job within the domain
//! - [`RunId`] — one execution attempt, always a v4 UUID
//!
//! [`ExecutionKey`] is the fully-resolved triple used to index shard-local
//! state; its run id is a parsed UUID by construction, so a key can never
//! carry the empty "current run" sentinel. [`WorkflowExecution`] is the raw
//! `(workflow_id, run_id)` pair as it arrives from callers, where an empty
//! run id means "whichever run is current".

pub mod id;
pub mod key;

pub use id::{DomainId, RunId, RunIdParseError, WorkflowId};
pub use key::{ExecutionKey, WorkflowExecution};
