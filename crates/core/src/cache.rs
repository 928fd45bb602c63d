//! Small time-to-live cache.
//!
//! Entries are replaced whole, never patched. Concurrent misses on the same
//! key may both recompute; the last insert wins.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Key -> (value, expiry instant) map with a fixed TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a clone of the live value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Like [`get`](Self::get) but evaluated at `now`.
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_before_expiry_miss_after() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(20));
        let t0 = Instant::now();
        cache.insert_at("BTC".to_string(), 7, t0);

        assert_eq!(cache.get_at(&"BTC".to_string(), t0 + Duration::from_secs(19)), Some(7));
        assert_eq!(cache.get_at(&"BTC".to_string(), t0 + Duration::from_secs(20)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_overwrites_whole_entry() {
        let cache: TtlCache<&'static str, Vec<u32>> = TtlCache::new(Duration::from_secs(5));
        cache.insert("k", vec![1, 2]);
        cache.insert("k", vec![3]);
        assert_eq!(cache.get(&"k"), Some(vec![3]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_evicts_expired_neighbours() {
        let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_secs(1));
        let t0 = Instant::now();
        cache.insert_at(1, 1, t0);
        cache.insert_at(2, 2, t0 + Duration::from_secs(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_removes_key() {
        let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, 10);
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }
}
