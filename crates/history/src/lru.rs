//! Pin-aware LRU map with a TTL ceiling.
//!
//! The execution cache must never drop an entry another caller still
//! holds: callers keep references across storage round-trips, and evicting
//! under them would let a second, independently constructed context appear
//! for the same key. Every lookup therefore pins the entry (a reference
//! count) and eviction only ever considers unpinned slots.
//!
//! Recency is tracked with a monotone access sequence rather than a clock
//! read per touch; eviction picks the unpinned slot with the smallest
//! sequence, so ties cannot arise.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::CacheOptions;
use crate::error::CacheError;

/// A size- and TTL-bounded map from keys to shared values.
///
/// All operations take a short internal critical section; nothing blocks
/// beyond it. Handles are cheap to clone and share one underlying map.
pub struct PinnedLruCache<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
    max_count: usize,
    ttl: Duration,
}

impl<K, V> Clone for PinnedLruCache<K, V> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            inner: Arc::clone(&self.inner),
            max_count: self.max_count,
            ttl: self.ttl,
        }
    }
}

struct Inner<K, V> {
    slots: HashMap<K, Slot<V>>,
    /// Monotone access sequence; bumped on every touch.
    access_seq: u64,
}

struct Slot<V> {
    value: Arc<V>,
    pins: u64,
    inserted_at: Instant,
    last_access: u64,
}

impl<K, V> PinnedLruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a map sized by the given options.
    #[must_use]
    pub fn new(options: &CacheOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slots: HashMap::with_capacity(options.initial_capacity.min(options.max_count)),
                access_seq: 0,
            })),
            max_count: options.max_count,
            ttl: options.ttl,
        }
    }

    /// Look up a key, pinning the entry on a hit.
    ///
    /// A TTL-expired entry is a miss: unpinned it is removed on encounter,
    /// pinned it stays resident (its holders are still mid-operation) but
    /// is not handed out again.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let (pins, expired) = match inner.slots.get(key) {
            None => return None,
            Some(slot) => (slot.pins, is_expired_at(slot, now, self.ttl)),
        };
        if expired {
            if pins == 0 {
                inner.slots.remove(key);
            }
            return None;
        }

        let seq = inner.next_seq();
        let slot = inner
            .slots
            .get_mut(key)
            .expect("slot checked present under the same lock");
        slot.pins += 1;
        slot.last_access = seq;
        Some(Arc::clone(&slot.value))
    }

    /// Insert a value if the key is vacant, pinning whichever value ends
    /// up resident.
    ///
    /// Returns the resident value: the existing one when a racer won the
    /// insert, otherwise `value` itself. Fails with
    /// [`CacheError::CapacityExhausted`] when the map is full and every
    /// resident entry is pinned.
    pub fn put_if_absent(&self, key: K, value: Arc<V>) -> Result<Arc<V>, CacheError> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        // An expired, unpinned leftover is replaced; anything pinned
        // stays authoritative for its key.
        let seq = inner.next_seq();
        match inner.slots.get_mut(&key) {
            Some(slot) if slot.pins > 0 || !is_expired_at(slot, now, self.ttl) => {
                slot.pins += 1;
                slot.last_access = seq;
                return Ok(Arc::clone(&slot.value));
            }
            Some(_) => {
                inner.slots.remove(&key);
            }
            None => {}
        }

        if inner.slots.len() >= self.max_count {
            self.purge_expired(&mut inner, now);
        }
        while inner.slots.len() >= self.max_count {
            let victim = inner
                .slots
                .iter()
                .filter(|(_, slot)| slot.pins == 0)
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    inner.slots.remove(&k);
                }
                None => {
                    return Err(CacheError::CapacityExhausted {
                        max_count: self.max_count,
                    });
                }
            }
        }

        inner.slots.insert(
            key,
            Slot {
                value: Arc::clone(&value),
                pins: 1,
                inserted_at: now,
                last_access: seq,
            },
        );
        Ok(value)
    }

    /// Drop one pin from the entry for `key`, if any.
    ///
    /// When the last pin is released a TTL-expired entry is removed
    /// immediately instead of lingering until the next encounter.
    pub fn release(&self, key: &K) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        // Capacity needs no check here: inserts evict below max_count
        // first, so the map is never over capacity.
        let remove = match inner.slots.get_mut(key) {
            None => return,
            Some(slot) => {
                debug_assert!(slot.pins > 0, "release without a matching pin");
                slot.pins = slot.pins.saturating_sub(1);
                slot.pins == 0 && is_expired_at(slot, now, self.ttl)
            }
        };
        if remove {
            inner.slots.remove(key);
        }
    }

    /// Number of resident entries, pinned or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    /// Current pin count for `key`, if resident.
    #[must_use]
    pub fn pin_count(&self, key: &K) -> Option<u64> {
        self.inner.lock().slots.get(key).map(|slot| slot.pins)
    }

    fn purge_expired(&self, inner: &mut Inner<K, V>, now: Instant) {
        let expired: Vec<K> = inner
            .slots
            .iter()
            .filter(|(_, slot)| slot.pins == 0 && is_expired_at(slot, now, self.ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            inner.slots.remove(&key);
        }
    }
}

/// TTL check; a zero TTL disables expiry.
fn is_expired_at<V>(slot: &Slot<V>, now: Instant, ttl: Duration) -> bool {
    ttl > Duration::ZERO && now.duration_since(slot.inserted_at) > ttl
}

impl<K, V> Inner<K, V> {
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_count: usize, ttl: Duration) -> CacheOptions {
        CacheOptions {
            initial_capacity: 4,
            max_count,
            ttl,
        }
    }

    fn cache(max_count: usize) -> PinnedLruCache<String, u32> {
        PinnedLruCache::new(&options(max_count, Duration::ZERO))
    }

    #[test]
    fn miss_on_empty() {
        let c = cache(4);
        assert!(c.get(&"k1".to_string()).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn put_then_get_pins_twice() {
        let c = cache(4);
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();
        assert_eq!(c.pin_count(&"k1".into()), Some(1));

        let hit = c.get(&"k1".into()).unwrap();
        assert_eq!(*hit, 1);
        assert_eq!(c.pin_count(&"k1".into()), Some(2));
    }

    #[test]
    fn put_if_absent_returns_existing() {
        let c = cache(4);
        let first = c.put_if_absent("k1".into(), Arc::new(1)).unwrap();
        let second = c.put_if_absent("k1".into(), Arc::new(2)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 1);
        assert_eq!(c.pin_count(&"k1".into()), Some(2));
    }

    #[test]
    fn release_decrements_to_zero() {
        let c = cache(4);
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();
        c.get(&"k1".into()).unwrap();
        c.release(&"k1".into());
        assert_eq!(c.pin_count(&"k1".into()), Some(1));
        c.release(&"k1".into());
        assert_eq!(c.pin_count(&"k1".into()), Some(0));
        // Entry stays resident for future hits.
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn release_of_absent_key_is_noop() {
        let c = cache(4);
        c.release(&"ghost".into());
        assert!(c.is_empty());
    }

    #[test]
    fn evicts_least_recently_used_unpinned() {
        let c = cache(2);
        c.put_if_absent("a".into(), Arc::new(1)).unwrap();
        c.put_if_absent("b".into(), Arc::new(2)).unwrap();
        c.release(&"a".into());
        c.release(&"b".into());

        // Touch "a" so "b" is the LRU victim.
        c.get(&"a".into()).unwrap();
        c.release(&"a".into());

        c.put_if_absent("c".into(), Arc::new(3)).unwrap();
        assert!(c.get(&"a".into()).is_some());
        assert!(c.get(&"b".into()).is_none());
        assert!(c.get(&"c".into()).is_some());
    }

    #[test]
    fn pinned_entries_are_never_evicted() {
        let c = cache(2);
        c.put_if_absent("a".into(), Arc::new(1)).unwrap();
        c.put_if_absent("b".into(), Arc::new(2)).unwrap();
        // "a" stays pinned, "b" is released and evictable.
        c.release(&"b".into());

        c.put_if_absent("c".into(), Arc::new(3)).unwrap();
        assert!(c.get(&"a".into()).is_some(), "pinned entry must survive");
        assert!(c.get(&"b".into()).is_none(), "unpinned LRU entry evicted");
    }

    #[test]
    fn capacity_exhausted_when_all_pinned() {
        let c = cache(2);
        c.put_if_absent("a".into(), Arc::new(1)).unwrap();
        c.put_if_absent("b".into(), Arc::new(2)).unwrap();

        let err = c.put_if_absent("c".into(), Arc::new(3)).unwrap_err();
        match err {
            CacheError::CapacityExhausted { max_count } => assert_eq!(max_count, 2),
            other => panic!("expected CapacityExhausted, got {other:?}"),
        }
        // The map is unchanged.
        assert_eq!(c.len(), 2);
        assert!(c.get(&"c".into()).is_none());
    }

    #[test]
    fn expired_unpinned_entry_is_removed_on_get() {
        let c: PinnedLruCache<String, u32> =
            PinnedLruCache::new(&options(4, Duration::from_millis(10)));
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();
        c.release(&"k1".into());

        std::thread::sleep(Duration::from_millis(30));
        assert!(c.get(&"k1".into()).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn expired_pinned_entry_stays_but_is_not_a_hit() {
        let c: PinnedLruCache<String, u32> =
            PinnedLruCache::new(&options(4, Duration::from_millis(10)));
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert!(c.get(&"k1".into()).is_none(), "expired entry is a miss");
        assert_eq!(c.len(), 1, "pinned entry stays resident");
        assert_eq!(c.pin_count(&"k1".into()), Some(1));
    }

    #[test]
    fn expired_pinned_entry_removed_on_last_release() {
        let c: PinnedLruCache<String, u32> =
            PinnedLruCache::new(&options(4, Duration::from_millis(10)));
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        c.release(&"k1".into());
        assert!(c.is_empty(), "expired entry removed when unpinned");
    }

    #[test]
    fn put_if_absent_replaces_expired_unpinned_leftover() {
        let c: PinnedLruCache<String, u32> =
            PinnedLruCache::new(&options(4, Duration::from_millis(10)));
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();
        c.release(&"k1".into());

        std::thread::sleep(Duration::from_millis(30));
        let fresh = c.put_if_absent("k1".into(), Arc::new(2)).unwrap();
        assert_eq!(*fresh, 2);
        assert_eq!(c.pin_count(&"k1".into()), Some(1));
    }

    #[test]
    fn put_if_absent_keeps_expired_pinned_entry_authoritative() {
        let c: PinnedLruCache<String, u32> =
            PinnedLruCache::new(&options(4, Duration::from_millis(10)));
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        // A racer inserting behind an expired-but-held entry must observe
        // the held one, not create a second value for the key.
        let resident = c.put_if_absent("k1".into(), Arc::new(2)).unwrap();
        assert_eq!(*resident, 1);
        assert_eq!(c.pin_count(&"k1".into()), Some(2));
    }

    #[test]
    fn insert_at_capacity_purges_expired_before_evicting() {
        let c: PinnedLruCache<String, u32> =
            PinnedLruCache::new(&options(2, Duration::from_millis(10)));
        c.put_if_absent("a".into(), Arc::new(1)).unwrap();
        c.release(&"a".into());
        std::thread::sleep(Duration::from_millis(30));

        // "b" is fresh and released; the expired "a" must go first.
        c.put_if_absent("b".into(), Arc::new(2)).unwrap();
        c.release(&"b".into());
        c.put_if_absent("c".into(), Arc::new(3)).unwrap();

        assert!(c.get(&"b".into()).is_some(), "fresh entry survives purge");
        assert!(c.get(&"c".into()).is_some());
    }

    #[test]
    fn zero_ttl_never_expires() {
        let c = cache(4);
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();
        c.release(&"k1".into());
        std::thread::sleep(Duration::from_millis(20));
        assert!(c.get(&"k1".into()).is_some());
    }

    #[test]
    fn handles_share_one_map() {
        let c = cache(4);
        let other = c.clone();
        c.put_if_absent("k1".into(), Arc::new(1)).unwrap();
        assert_eq!(other.len(), 1);
        assert!(other.get(&"k1".into()).is_some());
    }
}
