//! The cached execution context and its lock.
//!
//! One [`ExecutionContext`] exists per cached run; all read-modify-write
//! work against the run's mutable state happens while holding its lock.
//! The context itself performs no I/O at construction — the state snapshot
//! is hydrated from the store on first access and dropped again by
//! [`clear`](ExecutionContext::clear) so the next accessor reloads.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::ExecutionKey;
use strata_ports::{HistoryStore, VersionedState};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::CacheError;

/// In-memory envelope of one run's mutable state.
///
/// The cache layer mutates only the lock and the hydration cell; the
/// state payload is opaque here and interpreted by the transaction
/// managers above.
pub struct ExecutionContext {
    key: ExecutionKey,
    store: Arc<dyn HistoryStore>,
    lock: ContextLock,
    state: Mutex<Option<VersionedState>>,
}

impl ExecutionContext {
    /// Construct a context bound to one run. No I/O.
    #[must_use]
    pub fn new(key: ExecutionKey, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            key,
            store,
            lock: ContextLock::new(),
            state: Mutex::new(None),
        }
    }

    /// The run this context is bound to.
    #[must_use]
    pub fn key(&self) -> &ExecutionKey {
        &self.key
    }

    /// Acquire the context lock, suspending until it is held or the
    /// caller's cancellation fires.
    ///
    /// There is no fairness guarantee between waiters, only mutual
    /// exclusion and cancellation-responsiveness.
    pub async fn lock(&self, cancellation: &CancellationToken) -> Result<(), CacheError> {
        self.lock.acquire(cancellation).await
    }

    /// Release the context lock. Only the current holder may call this.
    pub fn unlock(&self) {
        self.lock.release();
    }

    /// Whether the lock is currently held. Intended for assertions.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    /// Discard the hydrated mutable state. Idempotent; the next
    /// [`mutable_state`](Self::mutable_state) call reloads from storage.
    pub fn clear(&self) {
        *self.state.lock() = None;
    }

    /// The run's mutable-state snapshot, hydrated from the store on first
    /// access after construction or [`clear`](Self::clear).
    ///
    /// Callers are expected to hold the context lock, which makes the
    /// hydration single-flight in practice.
    pub async fn mutable_state(&self) -> Result<VersionedState, CacheError> {
        if let Some(state) = self.state.lock().clone() {
            return Ok(state);
        }

        let loaded = self.store.get_execution_state(&self.key).await?;
        *self.state.lock() = Some(loaded.clone());
        Ok(loaded)
    }

    /// Whether a state snapshot is currently hydrated. Intended for
    /// assertions.
    #[must_use]
    pub fn has_hydrated_state(&self) -> bool {
        self.state.lock().is_some()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("key", &self.key)
            .field("locked", &self.is_locked())
            .field("hydrated", &self.has_hydrated_state())
            .finish()
    }
}

/// Cancellable mutual exclusion over a single permit.
///
/// Unlike a guard-based mutex, the permit is deliberately detached from
/// any lifetime: the facade locks on behalf of a caller and the release
/// handle unlocks later, possibly on another task.
struct ContextLock {
    permits: Semaphore,
}

impl ContextLock {
    fn new() -> Self {
        Self {
            permits: Semaphore::new(1),
        }
    }

    async fn acquire(&self, cancellation: &CancellationToken) -> Result<(), CacheError> {
        tokio::select! {
            permit = self.permits.acquire() => {
                permit
                    .expect("context lock semaphore is never closed")
                    .forget();
                Ok(())
            }
            () = cancellation.cancelled() => Err(CacheError::Cancelled),
        }
    }

    fn release(&self) {
        debug_assert!(
            self.permits.available_permits() == 0,
            "unlock without a matching lock"
        );
        self.permits.add_permits(1);
    }

    fn is_held(&self) -> bool {
        self.permits.available_permits() == 0
    }
}
