#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Strata History
//!
//! The shard-local execution context cache of the Strata history service.
//!
//! Each shard is the authoritative owner of a set of workflow executions.
//! For every execution it keeps an in-memory [`ExecutionContext`] that
//! wraps cached mutable state and serializes all read-modify-write work
//! behind a per-context lock. This crate provides:
//!
//! - [`ExecutionCache`] — the facade: `get_or_create` family, current-run
//!   resolution, pinning, locking, and release bookkeeping
//! - [`PinnedLruCache`] — a size- and TTL-bounded map that never evicts
//!   entries callers still hold
//! - [`ExecutionContext`] — the cached value, with a cancellable lock and
//!   on-demand mutable-state hydration
//! - [`RetryPolicy`] and [`retry`] — storage retry with exponential
//!   backoff, jitter, and prompt cancellation
//! - [`ShardContext`] and [`ShardConfig`] — the plumbing the cache is
//!   built from
//!
//! Acquisition hands back the context together with a single-shot
//! [`ReleaseHandle`]; dropping the handle during a panic still clears the
//! context, unlocks it, and releases the pin before the panic continues.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod lru;
pub mod retry;
pub mod shard;

pub use cache::{CallerScope, ExecutionCache, GetAndCreateResult, ReleaseHandle};
pub use config::{CacheOptions, ShardConfig};
pub use context::ExecutionContext;
pub use error::CacheError;
pub use lru::PinnedLruCache;
pub use retry::{retry, RetryPolicy};
pub use shard::ShardContext;
