//! Metrics primitives and registry.
//!
//! Provides counters and histograms plus a registry keyed by metric name
//! and an optional set of label pairs. Labelled lookups let one logical
//! metric fan out into per-scope, per-domain series without the registry
//! knowing anything about the label semantics. The empty string is a
//! legal label value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

/// An incrementing counter.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Create a new counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by a given amount.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A histogram that records observations.
///
/// Observations are kept in memory; suitable for the in-process registry
/// this crate provides, not for unbounded production series.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    observations: Arc<RwLock<Vec<f64>>>,
}

impl Histogram {
    /// Create a new histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation.
    pub fn observe(&self, value: f64) {
        self.observations.write().push(value);
    }

    /// Record a duration in seconds.
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64());
    }

    /// Number of observations recorded.
    #[must_use]
    pub fn count(&self) -> usize {
        self.observations.read().len()
    }

    /// Sum of all observations.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.observations.read().iter().sum()
    }
}

/// Key for a labelled metric series: name plus sorted label pairs.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct SeriesKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        labels.sort();
        Self {
            name: name.to_owned(),
            labels,
        }
    }
}

/// Registry for creating and retrieving named metrics.
///
/// Retrieving the same name (and label set) returns a handle to the same
/// underlying metric.
///
/// # Examples
///
/// ```
/// use strata_telemetry::MetricsRegistry;
///
/// let registry = MetricsRegistry::new();
/// registry.counter("history_cache_requests_total").inc();
/// assert_eq!(registry.counter("history_cache_requests_total").get(), 1);
///
/// let wait = registry.labeled_histogram(
///     "history_cache_lock_wait_seconds",
///     &[("scope", "timer_active"), ("domain", "payments")],
/// );
/// wait.observe(0.004);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    counters: Arc<RwLock<HashMap<SeriesKey, Counter>>>,
    histograms: Arc<RwLock<HashMap<SeriesKey, Histogram>>>,
}

impl MetricsRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create an unlabelled counter by name.
    pub fn counter(&self, name: &str) -> Counter {
        self.labeled_counter(name, &[])
    }

    /// Get or create a counter for a specific label set.
    ///
    /// Label order does not matter; pairs are sorted before keying.
    pub fn labeled_counter(&self, name: &str, labels: &[(&str, &str)]) -> Counter {
        let key = SeriesKey::new(name, labels);
        self.counters.write().entry(key).or_default().clone()
    }

    /// Get or create an unlabelled histogram by name.
    pub fn histogram(&self, name: &str) -> Histogram {
        self.labeled_histogram(name, &[])
    }

    /// Get or create a histogram for a specific label set.
    pub fn labeled_histogram(&self, name: &str, labels: &[(&str, &str)]) -> Histogram {
        let key = SeriesKey::new(name, labels);
        self.histograms.write().entry(key).or_default().clone()
    }
}
