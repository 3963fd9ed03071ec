//! Shard configuration for the execution cache.

use std::time::Duration;

/// Dynamic shard configuration consumed by the history service.
///
/// Only the execution cache knobs live here; other shard settings are out
/// of this crate's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardConfig {
    /// Initial capacity hint for the execution cache map.
    pub history_cache_initial_size: usize,
    /// Hard cap on resident execution cache entries.
    pub history_cache_max_size: usize,
    /// Per-entry time-to-live; `Duration::ZERO` disables expiry.
    pub history_cache_ttl: Duration,
    /// Administrative bypass: when set, acquisitions construct fresh,
    /// unpinned, unlocked contexts. Test hook only — concurrent callers
    /// are not serialized in this mode.
    pub history_cache_disabled: bool,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            history_cache_initial_size: 128,
            history_cache_max_size: 512,
            history_cache_ttl: Duration::from_secs(3600),
            history_cache_disabled: false,
        }
    }
}

/// Sizing options of the pin-aware map, derived from [`ShardConfig`].
///
/// Pinning on both insert and get is fixed by the cache design rather than
/// configurable: dropping an entry another caller still holds would let a
/// second context appear for the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Initial map capacity hint.
    pub initial_capacity: usize,
    /// Hard cap on resident entries.
    pub max_count: usize,
    /// Per-entry time-to-live; `Duration::ZERO` disables expiry.
    pub ttl: Duration,
}

impl From<&ShardConfig> for CacheOptions {
    fn from(config: &ShardConfig) -> Self {
        Self {
            initial_capacity: config.history_cache_initial_size,
            max_count: config.history_cache_max_size,
            ttl: config.history_cache_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_production_sized() {
        let config = ShardConfig::default();
        assert_eq!(config.history_cache_initial_size, 128);
        assert_eq!(config.history_cache_max_size, 512);
        assert_eq!(config.history_cache_ttl, Duration::from_secs(3600));
        assert!(!config.history_cache_disabled);
    }

    #[test]
    fn options_derive_from_config() {
        let config = ShardConfig {
            history_cache_initial_size: 4,
            history_cache_max_size: 16,
            history_cache_ttl: Duration::from_secs(60),
            history_cache_disabled: false,
        };
        let options = CacheOptions::from(&config);
        assert_eq!(options.initial_capacity, 4);
        assert_eq!(options.max_count, 16);
        assert_eq!(options.ttl, Duration::from_secs(60));
    }
}
