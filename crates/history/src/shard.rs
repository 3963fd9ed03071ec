//! Shard plumbing handed to the execution cache.

use std::sync::Arc;

use strata_ports::{DomainDirectory, HistoryStore};
use strata_telemetry::MetricsRegistry;

use crate::config::ShardConfig;

/// The slice of a shard the execution cache is built from: configuration,
/// the durable store, the domain directory, and the metrics registry.
///
/// Owned by the shard controller and shared with every component running
/// on the shard.
pub struct ShardContext {
    shard_id: u32,
    config: ShardConfig,
    store: Arc<dyn HistoryStore>,
    domains: Arc<dyn DomainDirectory>,
    metrics: Arc<MetricsRegistry>,
}

impl ShardContext {
    /// Assemble a shard context from its components.
    pub fn new(
        shard_id: u32,
        config: ShardConfig,
        store: Arc<dyn HistoryStore>,
        domains: Arc<dyn DomainDirectory>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            shard_id,
            config,
            store,
            domains,
            metrics,
        }
    }

    /// Numeric identifier of this shard.
    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Shard configuration.
    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// The durable execution store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// The domain directory used for labelling.
    #[must_use]
    pub fn domains(&self) -> &Arc<dyn DomainDirectory> {
        &self.domains
    }

    /// The shard's metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }
}
