#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Strata Ports
//!
//! Persistence interfaces consumed by the history service. Backend drivers
//! implement these traits; the service is written against the traits only.
//!
//! - [`HistoryStore`] — durable execution records: current-run lookup and
//!   mutable-state snapshots
//! - [`DomainDirectory`] — best-effort domain id → name resolution, used
//!   for metric labels
//! - [`StoreError`] — shared error taxonomy with a transient/permanent
//!   split that drives retry decisions upstream

pub mod domain;
pub mod error;
pub mod history;

pub use domain::DomainDirectory;
pub use error::StoreError;
pub use history::{
    GetCurrentExecutionRequest, GetCurrentExecutionResponse, HistoryStore, VersionedState,
    WorkflowCloseStatus,
};
