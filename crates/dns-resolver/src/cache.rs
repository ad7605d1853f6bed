//! The Cache Engine, per §4.4: an in-memory, TTL-bounded answer
//! cache keyed by `(name-key, type-key, value-key)`.
//!
//! Structured the way `dns-resolver`'s original `PartitionedCache`
//! wraps a `Mutex`-guarded inner structure behind a cheaply-`Clone`
//! handle -- but the spec's cache has no size budget or LRU eviction,
//! so the inner structure is a plain map instead of a
//! `PriorityQueue`-backed partition set. Expired entries are left in
//! place and simply ignored by `lookup` (and by `is_blocked`-style
//! matching via `value_key`); `prune` is there for a maintenance task
//! to call periodically, not for correctness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::normalize::{name_key, record_type_key, value_key};
use crate::store::Record;

const MUTEX_POISON_MESSAGE: &str = "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

/// A single cached answer, per §3's Cache Record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub name: String,
    pub rtype: String,
    pub value: String,
    pub ttl: u32,
    pub expiry: SystemTime,
    pub timestamp: SystemTime,
    pub last_query: SystemTime,
}

impl CacheRecord {
    fn key(&self) -> (String, String, String) {
        (name_key(&self.name), record_type_key(&self.rtype), value_key(&self.rtype, &self.value))
    }

    /// Is this entry valid for lookup at `now`?
    pub fn is_valid(&self, now: SystemTime) -> bool {
        now < self.expiry
    }

    /// Remaining TTL in seconds at `now`, per §3: `ceil(expiry - now)`.
    /// Zero if already expired.
    pub fn remaining_ttl(&self, now: SystemTime) -> u32 {
        match self.expiry.duration_since(now) {
            Ok(remaining) => {
                let secs = remaining.as_secs();
                let nanos = remaining.subsec_nanos();
                let rounded = if nanos > 0 { secs + 1 } else { secs };
                rounded.min(u32::MAX as u64) as u32
            }
            Err(_) => 0,
        }
    }
}

#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<(String, String, String), CacheRecord>,
}

impl Cache {
    fn lookup(&self, name: &str, rtype: &str, now: SystemTime) -> Option<CacheRecord> {
        let nk = name_key(name);
        let tk = record_type_key(rtype);
        self.entries
            .values()
            .find(|entry| entry.is_valid(now) && name_key(&entry.name) == nk && record_type_key(&entry.rtype) == tk)
            .cloned()
    }

    fn insert(&mut self, record: &Record, now: SystemTime) {
        let key = (record.name_key(), record_type_key(&record.rtype), record.value_key());
        let expiry = now + Duration::from_secs(u64::from(record.ttl));
        self.entries
            .entry(key)
            .and_modify(|existing| {
                existing.ttl = record.ttl;
                existing.expiry = expiry;
                existing.last_query = now;
            })
            .or_insert_with(|| CacheRecord {
                name: record.name.clone(),
                rtype: record.rtype.clone(),
                value: record.value.clone(),
                ttl: record.ttl,
                expiry,
                timestamp: now,
                last_query: now,
            });
    }

    fn prune(&mut self, now: SystemTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid(now));
        before - self.entries.len()
    }
}

/// A convenience wrapper around a `Cache` which lets it be shared
/// between threads. Cloning gives a new handle to the same underlying
/// cache.
#[derive(Debug, Clone, Default)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

impl SharedCache {
    pub fn new() -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::default())),
        }
    }

    /// Look up `(name, type)`, returning the single best remaining
    /// entry with its TTL adjusted to `now`. `None` on a miss.
    ///
    /// # Panics
    /// If the mutex has been poisoned.
    pub fn lookup(&self, name: &str, rtype: &str, now: SystemTime) -> Option<CacheRecord> {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).lookup(name, rtype, now)
    }

    /// Insert or refresh a record in the cache, keyed by
    /// `(name-key, type-key, value-key)`, per §4.4.
    ///
    /// # Panics
    /// If the mutex has been poisoned.
    pub fn insert(&self, record: &Record, now: SystemTime) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).insert(record, now);
    }

    pub fn insert_all(&self, records: &[Record], now: SystemTime) {
        let mut cache = self.cache.lock().expect(MUTEX_POISON_MESSAGE);
        for record in records {
            cache.insert(record, now);
        }
    }

    /// Drop expired entries. Returns the number removed.
    ///
    /// # Panics
    /// If the mutex has been poisoned.
    pub fn prune(&self, now: SystemTime) -> usize {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).prune(now)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, rtype: &str, value: &str, ttl: u32) -> Record {
        Record::new(name, rtype, value, Some(ttl)).unwrap()
    }

    #[test]
    fn insert_then_lookup_hits() {
        let cache = SharedCache::new();
        let now = SystemTime::now();
        cache.insert(&record("test.example.com", "A", "1.2.3.4", 60), now);
        let hit = cache.lookup("test.example.com", "A", now).unwrap();
        assert_eq!(hit.value, "1.2.3.4");
    }

    #[test]
    fn lookup_is_case_and_dot_insensitive() {
        let cache = SharedCache::new();
        let now = SystemTime::now();
        cache.insert(&record("test.example.com", "A", "1.2.3.4", 60), now);
        assert!(cache.lookup("Test.Example.com.", "a", now).is_some());
    }

    #[test]
    fn ttl_remaining_rounds_up() {
        let cache = SharedCache::new();
        let t0 = SystemTime::now();
        cache.insert(&record("test.example.com", "A", "1.2.3.4", 60), t0);
        let queried_at = t0 + Duration::from_secs(40);
        let hit = cache.lookup("test.example.com", "A", queried_at).unwrap();
        assert_eq!(hit.remaining_ttl(queried_at), 20);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = SharedCache::new();
        let t0 = SystemTime::now();
        cache.insert(&record("test.example.com", "A", "1.2.3.4", 60), t0);
        let queried_at = t0 + Duration::from_secs(61);
        assert!(cache.lookup("test.example.com", "A", queried_at).is_none());
    }

    #[test]
    fn reinserting_same_triple_overwrites_not_appends() {
        let cache = SharedCache::new();
        let now = SystemTime::now();
        cache.insert(&record("test.example.com", "A", "1.2.3.4", 60), now);
        cache.insert(&record("test.example.com", "A", "1.2.3.4", 120), now);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_values_are_distinct_entries() {
        let cache = SharedCache::new();
        let now = SystemTime::now();
        cache.insert(&record("test.example.com", "A", "1.2.3.4", 60), now);
        cache.insert(&record("test.example.com", "A", "5.6.7.8", 60), now);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn prune_removes_only_expired() {
        let cache = SharedCache::new();
        let t0 = SystemTime::now();
        cache.insert(&record("fresh.example.com", "A", "1.2.3.4", 600), t0);
        cache.insert(&record("stale.example.com", "A", "5.6.7.8", 10), t0);
        let removed = cache.prune(t0 + Duration::from_secs(20));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }
}
