//! The execution cache facade.
//!
//! Orchestrates the pin-aware map, the per-context lock, current-run
//! resolution, and release bookkeeping. A successful acquisition returns
//! the context together with a [`ReleaseHandle`]; the caller holds both a
//! pin (the entry cannot be evicted) and the context lock (no other caller
//! can touch the run's mutable state) until the handle is released.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_core::{DomainId, ExecutionKey, RunId, WorkflowExecution};
use strata_ports::{DomainDirectory, GetCurrentExecutionRequest, HistoryStore};
use strata_telemetry::{Histogram, MetricsRegistry};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::CacheOptions;
use crate::context::ExecutionContext;
use crate::error::CacheError;
use crate::lru::PinnedLruCache;
use crate::retry::{retry, RetryPolicy};
use crate::shard::ShardContext;

const REQUESTS: &str = "history_cache_requests_total";
const MISSES: &str = "history_cache_misses_total";
const FAILURES: &str = "history_cache_failures_total";
const LOCK_FAILURES: &str = "history_cache_lock_failures_total";
const LATENCY: &str = "history_cache_latency_seconds";
const LOCK_WAIT: &str = "history_cache_lock_wait_seconds";
const LOCK_HOLD: &str = "history_cache_lock_hold_seconds";

/// Facade operation, used as the `op` metric label.
#[derive(Debug, Clone, Copy)]
enum Op {
    GetOrCreate,
    GetOrCreateCurrent,
    GetAndCreate,
    ResolveCurrent,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Self::GetOrCreate => "get_or_create",
            Self::GetOrCreateCurrent => "get_or_create_current",
            Self::GetAndCreate => "get_and_create",
            Self::ResolveCurrent => "resolve_current",
        }
    }
}

/// The calling operation, used to tag lock-wait and lock-hold latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerScope {
    /// Frontend-facing API handlers.
    Api,
    /// Active timer task processing.
    TimerActive,
    /// Transfer queue task processing.
    TransferActive,
    /// Replication task processing.
    Replication,
    /// Cross-cluster task processing.
    CrossCluster,
    /// Shard-local background maintenance.
    Background,
}

impl CallerScope {
    /// The metric label for this scope.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::TimerActive => "timer_active",
            Self::TransferActive => "transfer_active",
            Self::Replication => "replication",
            Self::CrossCluster => "cross_cluster",
            Self::Background => "background",
        }
    }
}

/// Observes a histogram with the elapsed time when dropped, so latency is
/// recorded on every exit path, including early returns and cancellations.
struct LatencyRecorder {
    histogram: Histogram,
    started: Instant,
}

impl LatencyRecorder {
    fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            started: Instant::now(),
        }
    }
}

impl Drop for LatencyRecorder {
    fn drop(&mut self) {
        self.histogram.observe_duration(self.started.elapsed());
    }
}

/// Shard-local cache of workflow execution contexts.
///
/// At most one [`ExecutionContext`] exists per run key at any time; all
/// concurrent acquirers of the same key receive the same instance and are
/// serialized by its lock. Entries are evicted LRU-with-TTL, but never
/// while a caller holds them.
pub struct ExecutionCache {
    executions: PinnedLruCache<ExecutionKey, ExecutionContext>,
    store: Arc<dyn HistoryStore>,
    domains: Arc<dyn DomainDirectory>,
    metrics: Arc<MetricsRegistry>,
    disabled: bool,
}

impl ExecutionCache {
    /// Build the cache from the shard it serves.
    #[must_use]
    pub fn new(shard: &ShardContext) -> Self {
        let options = CacheOptions::from(shard.config());
        Self {
            executions: PinnedLruCache::new(&options),
            store: Arc::clone(shard.store()),
            domains: Arc::clone(shard.domains()),
            metrics: Arc::clone(shard.metrics()),
            disabled: shard.config().history_cache_disabled,
        }
    }

    /// Acquire the context for a workflow execution, creating and caching
    /// it on first use.
    ///
    /// An empty `run_id` in `execution` is resolved to the current run
    /// against storage (with retry) before lookup; a non-empty one must be
    /// a well-formed UUID. On success the caller holds both a pin and the
    /// context lock until the returned handle is released.
    pub async fn get_or_create(
        &self,
        cancellation: &CancellationToken,
        domain_id: DomainId,
        execution: &WorkflowExecution,
        caller: CallerScope,
    ) -> Result<(Arc<ExecutionContext>, ReleaseHandle), CacheError> {
        let op = Op::GetOrCreate;
        self.count(REQUESTS, op);
        let _latency = self.latency(op);

        let run_id = match self.resolve_run_id(cancellation, &domain_id, execution).await {
            Ok(run_id) => run_id,
            Err(err) => {
                self.count(FAILURES, op);
                return Err(err);
            }
        };

        let key = ExecutionKey::new(domain_id, execution.workflow_id.as_str(), run_id);
        self.acquire(cancellation, key, false, caller.as_str(), op).await
    }

    /// Acquire the context for whichever run of `workflow_id` is current.
    ///
    /// The run id is always resolved against storage, and the returned
    /// handle force-clears the context on release: the resolved identity
    /// may be stale by the next acquisition, so the next reader must
    /// resolve currency again and reload from storage.
    pub async fn get_or_create_current(
        &self,
        cancellation: &CancellationToken,
        domain_id: DomainId,
        workflow_id: &str,
    ) -> Result<(Arc<ExecutionContext>, ReleaseHandle), CacheError> {
        let op = Op::GetOrCreateCurrent;
        self.count(REQUESTS, op);
        let _latency = self.latency(op);

        let execution = WorkflowExecution::current(workflow_id);
        let run_id = match self.resolve_run_id(cancellation, &domain_id, &execution).await {
            Ok(run_id) => run_id,
            Err(err) => {
                self.count(FAILURES, op);
                return Err(err);
            }
        };

        let key = ExecutionKey::new(domain_id, workflow_id, run_id);
        self.acquire(cancellation, key, true, op.as_str(), op).await
    }

    /// Diagnostic read for analysis paths: the cached context (locked and
    /// pinned, if resident) plus an uncached sibling bound to the same
    /// key.
    ///
    /// The sibling never enters the map and shares no state with the
    /// cached context; its lifecycle is entirely the caller's.
    pub async fn get_and_create(
        &self,
        cancellation: &CancellationToken,
        domain_id: DomainId,
        execution: &WorkflowExecution,
        caller: CallerScope,
    ) -> Result<GetAndCreateResult, CacheError> {
        let op = Op::GetAndCreate;
        self.count(REQUESTS, op);
        let _latency = self.latency(op);

        let run_id = match self.resolve_run_id(cancellation, &domain_id, execution).await {
            Ok(run_id) => run_id,
            Err(err) => {
                self.count(FAILURES, op);
                return Err(err);
            }
        };

        let key = ExecutionKey::new(domain_id, execution.workflow_id.as_str(), run_id);
        let fresh = Arc::new(ExecutionContext::new(key.clone(), Arc::clone(&self.store)));

        let Some(cached) = self.executions.get(&key) else {
            self.count(MISSES, op);
            return Ok(GetAndCreateResult {
                cached: None,
                fresh,
                release: ReleaseHandle::noop(),
            });
        };

        let domain_name = self.domain_label(&key.domain_id);
        let wait_started = Instant::now();
        let locked = cached.lock(cancellation).await;
        self.metrics
            .labeled_histogram(
                LOCK_WAIT,
                &[("scope", caller.as_str()), ("domain", domain_name.as_str())],
            )
            .observe_duration(wait_started.elapsed());

        if let Err(err) = locked {
            self.executions.release(&key);
            self.count(FAILURES, op);
            self.count(LOCK_FAILURES, op);
            return Err(err);
        }

        let release = ReleaseHandle::engaged(
            self.executions.clone(),
            Arc::clone(&cached),
            key,
            false,
            caller.as_str(),
            domain_name,
            Arc::clone(&self.metrics),
        );
        Ok(GetAndCreateResult {
            cached: Some(cached),
            fresh,
            release,
        })
    }

    /// [`get_or_create`](Self::get_or_create) under a scope that never
    /// cancels. For background tasks that must not abandon the lock wait.
    pub async fn get_or_create_for_background(
        &self,
        domain_id: DomainId,
        execution: &WorkflowExecution,
        caller: CallerScope,
    ) -> Result<(Arc<ExecutionContext>, ReleaseHandle), CacheError> {
        self.get_or_create(&CancellationToken::new(), domain_id, execution, caller)
            .await
    }

    /// [`get_or_create`](Self::get_or_create) under a scope that cancels
    /// after `timeout`.
    pub async fn get_or_create_with_timeout(
        &self,
        domain_id: DomainId,
        execution: &WorkflowExecution,
        timeout: Duration,
        caller: CallerScope,
    ) -> Result<(Arc<ExecutionContext>, ReleaseHandle), CacheError> {
        let cancellation = CancellationToken::new();
        let deadline = cancellation.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            deadline.cancel();
        });

        let result = self
            .get_or_create(&cancellation, domain_id, execution, caller)
            .await;
        timer.abort();
        result
    }

    /// Number of contexts currently resident, pinned or not.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.executions.len()
    }

    /// Validate the execution reference and produce its concrete run id,
    /// resolving the current run when the caller left it empty.
    async fn resolve_run_id(
        &self,
        cancellation: &CancellationToken,
        domain_id: &DomainId,
        execution: &WorkflowExecution,
    ) -> Result<RunId, CacheError> {
        if execution.workflow_id.is_empty() {
            return Err(CacheError::WorkflowIdNotSet);
        }

        if execution.has_run_id() {
            RunId::parse(&execution.run_id).map_err(|err| CacheError::InvalidRunId(err.input))
        } else {
            self.resolve_current_run(cancellation, domain_id, &execution.workflow_id)
                .await
        }
    }

    /// Ask storage which run is current, through the persistence retry
    /// policy. Non-transient failures (including "no current execution")
    /// propagate unchanged.
    async fn resolve_current_run(
        &self,
        cancellation: &CancellationToken,
        domain_id: &DomainId,
        workflow_id: &str,
    ) -> Result<RunId, CacheError> {
        let op = Op::ResolveCurrent;
        self.count(REQUESTS, op);
        let _latency = self.latency(op);

        let request = GetCurrentExecutionRequest {
            domain_id: domain_id.clone(),
            workflow_id: workflow_id.into(),
        };
        let store = Arc::clone(&self.store);
        let policy = RetryPolicy::persistence();

        let response = retry(&policy, cancellation, move || {
            let store = Arc::clone(&store);
            let request = request.clone();
            async move { store.get_current_execution(request).await }
        })
        .await;

        match response {
            Ok(response) => Ok(response.run_id),
            Err(err) => {
                self.count(FAILURES, op);
                Err(err)
            }
        }
    }

    /// Get-or-insert the context for `key`, then take its lock on behalf
    /// of the caller.
    async fn acquire(
        &self,
        cancellation: &CancellationToken,
        key: ExecutionKey,
        force_clear: bool,
        scope: &'static str,
        op: Op,
    ) -> Result<(Arc<ExecutionContext>, ReleaseHandle), CacheError> {
        if self.disabled {
            // Bypass hook: fresh context, no pinning, no serialization.
            let context = Arc::new(ExecutionContext::new(key, Arc::clone(&self.store)));
            return Ok((context, ReleaseHandle::noop()));
        }

        let context = match self.executions.get(&key) {
            Some(context) => context,
            None => {
                self.count(MISSES, op);
                debug!(key = %key, "execution context cache miss");
                let fresh = Arc::new(ExecutionContext::new(key.clone(), Arc::clone(&self.store)));
                match self.executions.put_if_absent(key.clone(), fresh) {
                    Ok(context) => context,
                    Err(err) => {
                        self.count(FAILURES, op);
                        return Err(err);
                    }
                }
            }
        };

        let domain_name = self.domain_label(&key.domain_id);
        let wait_started = Instant::now();
        let locked = context.lock(cancellation).await;
        self.metrics
            .labeled_histogram(
                LOCK_WAIT,
                &[("scope", scope), ("domain", domain_name.as_str())],
            )
            .observe_duration(wait_started.elapsed());

        if let Err(err) = locked {
            // The caller's scope ended first; undo the pin acquired above.
            self.executions.release(&key);
            self.count(FAILURES, op);
            self.count(LOCK_FAILURES, op);
            debug!(key = %key, "cancelled while waiting for execution context lock");
            return Err(err);
        }

        let release = ReleaseHandle::engaged(
            self.executions.clone(),
            Arc::clone(&context),
            key,
            force_clear,
            scope,
            domain_name,
            Arc::clone(&self.metrics),
        );
        Ok((context, release))
    }

    /// Best-effort domain name for metric labels; failures become `""`.
    fn domain_label(&self, domain_id: &DomainId) -> String {
        self.domains.domain_name(domain_id).unwrap_or_default()
    }

    fn count(&self, name: &str, op: Op) {
        self.metrics
            .labeled_counter(name, &[("op", op.as_str())])
            .inc();
    }

    fn latency(&self, op: Op) -> LatencyRecorder {
        LatencyRecorder::new(
            self.metrics
                .labeled_histogram(LATENCY, &[("op", op.as_str())]),
        )
    }
}

/// Result of [`ExecutionCache::get_and_create`].
pub struct GetAndCreateResult {
    /// The cached context, locked and pinned — `Some` on a cache hit.
    pub cached: Option<Arc<ExecutionContext>>,
    /// An uncached context bound to the same key; never inserted into the
    /// map, never locked, lifecycle owned by the caller.
    pub fresh: Arc<ExecutionContext>,
    /// Release handle for `cached`; a no-op on a miss.
    pub release: ReleaseHandle,
}

impl std::fmt::Debug for GetAndCreateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetAndCreateResult")
            .field("cached", &self.cached.is_some())
            .field("release", &self.release)
            .finish()
    }
}

impl GetAndCreateResult {
    /// Whether the lookup hit the cache.
    #[must_use]
    pub fn hit(&self) -> bool {
        self.cached.is_some()
    }
}

/// Single-shot handle that ends an acquisition.
///
/// Releasing clears the context when the caller reports an error (or the
/// handle was created in force-clear mode), unlocks it, records the lock
/// hold time, and drops the pin — in that order. Repeated invocation is a
/// no-op, enforced by an atomic flag.
///
/// Dropping the handle without releasing it is safe: during a panic
/// unwind the context is cleared first (its state may be half-mutated)
/// and the panic continues; on a plain drop the handle behaves as a
/// successful release. Leaking the lock is never an option — a wedged
/// context would stall its run forever.
pub struct ReleaseHandle {
    inner: Option<HandleInner>,
}

impl std::fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("engaged", &self.inner.is_some())
            .finish()
    }
}

struct HandleInner {
    executions: PinnedLruCache<ExecutionKey, ExecutionContext>,
    context: Arc<ExecutionContext>,
    key: ExecutionKey,
    force_clear: bool,
    scope: &'static str,
    domain_name: String,
    metrics: Arc<MetricsRegistry>,
    acquired_at: Instant,
    released: AtomicBool,
}

impl ReleaseHandle {
    /// A disengaged handle; every invocation is a no-op. Handed out by
    /// bypass mode and by [`ExecutionCache::get_and_create`] misses.
    #[must_use]
    pub fn noop() -> Self {
        Self { inner: None }
    }

    fn engaged(
        executions: PinnedLruCache<ExecutionKey, ExecutionContext>,
        context: Arc<ExecutionContext>,
        key: ExecutionKey,
        force_clear: bool,
        scope: &'static str,
        domain_name: String,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            inner: Some(HandleInner {
                executions,
                context,
                key,
                force_clear,
                scope,
                domain_name,
                metrics,
                acquired_at: Instant::now(),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// End the acquisition, reporting the outcome of the locked region.
    ///
    /// A non-`None` error clears the context before unlocking so the next
    /// acquirer reloads from storage instead of trusting half-applied
    /// state.
    pub fn release(&self, err: Option<&dyn Error>) {
        let Some(inner) = &self.inner else { return };
        if let Some(err) = err {
            debug!(key = %inner.key, error = %err, "clearing execution context after failed operation");
        }
        inner.finish(err.is_some());
    }
}

impl HandleInner {
    fn finish(&self, clear: bool) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        if clear || self.force_clear {
            self.context.clear();
        }
        self.context.unlock();
        self.metrics
            .labeled_histogram(
                LOCK_HOLD,
                &[("scope", self.scope), ("domain", self.domain_name.as_str())],
            )
            .observe_duration(self.acquired_at.elapsed());
        self.executions.release(&self.key);
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        if let Some(inner) = &self.inner {
            // A drop mid-unwind means the locked region panicked without
            // reporting an outcome: treat it as the fault path and clear
            // before unlocking. The panic keeps propagating on its own.
            inner.finish(std::thread::panicking());
        }
    }
}
