use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_CAPACITY: usize = 64;

/// SHA-256 over the JSON encoding of `value`, prefixed by `domain` so that
/// equal payloads of different job kinds do not collide.
pub fn content_key<T: Serialize>(domain: &str, value: &T) -> serde_json::Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(value)?);
    Ok(hex::encode(hasher.finalize()))
}

struct Entry<V> {
    value: V,
    inserted: Instant,
    last_used: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    clock: u64,
}

/// Thread-safe memo of finished results with a time-to-live and
/// least-recently-used eviction once `capacity` is reached.
pub struct ResultCache<V> {
    inner: Mutex<Inner<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // no critical section leaves an entry half written
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let expired = inner
            .entries
            .get(key)
            .is_some_and(|e| e.inserted.elapsed() > self.ttl);
        if expired {
            inner.entries.remove(key);
            debug!("cache entry {key} expired");
            return None;
        }
        inner.clock += 1;
        let now = inner.clock;
        inner.entries.get_mut(key).map(|e| {
            e.last_used = now;
            e.value.clone()
        })
    }

    pub fn insert(&self, key: String, value: V) {
        let mut inner = self.lock();
        let ttl = self.ttl;
        inner.entries.retain(|_, e| e.inserted.elapsed() <= ttl);
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                debug!("evicting cache entry {k}");
                inner.entries.remove(&k);
            }
        }
        inner.clock += 1;
        let last_used = inner.clock;
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                last_used,
            },
        );
    }

    /// Cached value for `key`, or the result of `compute` (stored on success).
    ///
    /// The lock is not held while computing, so two threads racing on the
    /// same key may both compute; the later insert wins.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(v) = self.get(key) {
            debug!("cache hit {key}");
            return Ok(v);
        }
        let value = compute()?;
        self.insert(key.to_string(), value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn key_depends_on_domain_and_content() {
        let a = content_key("level", &[1.0, 2.0]).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_key("level", &[1.0, 2.0]).unwrap());
        assert_ne!(a, content_key("alignment", &[1.0, 2.0]).unwrap());
        assert_ne!(a, content_key("level", &[1.0, 2.5]).unwrap());
    }

    #[test]
    fn compute_runs_once_per_key() {
        let cache = ResultCache::default();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let v: Result<i32, ()> = cache.get_or_try_insert_with("k", || {
                calls.set(calls.get() + 1);
                Ok(7)
            });
            assert_eq!(v, Ok(7));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: ResultCache<i32> = ResultCache::default();
        assert_eq!(cache.get_or_try_insert_with("k", || Err("boom")), Err("boom"));
        assert!(cache.is_empty());
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = ResultCache::new(DEFAULT_TTL, 2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".into(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = ResultCache::new(Duration::ZERO, 4);
        cache.insert("a".into(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }
}
