//! Stats Hooks, per §3/§5: thread-safe, monotonic, process-lifetime
//! counters. Built from plain atomics rather than a mutex-guarded
//! struct -- per §7, "failures in stats counter updates are
//! impossible by construction (atomic)".

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct Stats {
    total_queries: AtomicU64,
    total_cache_hits: AtomicU64,
    total_blocks: AtomicU64,
    total_queries_forwarded: AtomicU64,
    total_queries_answered: AtomicU64,
    server_start_time: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        let stats = Stats::default();
        stats.server_start_time.store(now_secs(), Ordering::Relaxed);
        stats
    }

    pub fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.total_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block(&self) {
        self.total_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.total_queries_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_answered(&self) {
        self.total_queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            total_cache_hits: self.total_cache_hits.load(Ordering::Relaxed),
            total_blocks: self.total_blocks.load(Ordering::Relaxed),
            total_queries_forwarded: self.total_queries_forwarded.load(Ordering::Relaxed),
            total_queries_answered: self.total_queries_answered.load(Ordering::Relaxed),
            server_start_time: self.server_start_time.load(Ordering::Relaxed),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// A point-in-time read of the counters, for admin/metrics surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub total_cache_hits: u64,
    pub total_blocks: u64,
    pub total_queries_forwarded: u64,
    pub total_queries_answered: u64,
    pub server_start_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.total_queries, 0);
        assert_eq!(snap.total_cache_hits, 0);
        assert_eq!(snap.total_blocks, 0);
        assert!(snap.server_start_time > 0);
    }

    #[test]
    fn each_counter_increments_independently() {
        let stats = Stats::new();
        stats.record_query();
        stats.record_query();
        stats.record_cache_hit();
        stats.record_block();
        stats.record_forwarded();
        stats.record_answered();
        let snap = stats.snapshot();
        assert_eq!(snap.total_queries, 2);
        assert_eq!(snap.total_cache_hits, 1);
        assert_eq!(snap.total_blocks, 1);
        assert_eq!(snap.total_queries_forwarded, 1);
        assert_eq!(snap.total_queries_answered, 1);
    }
}
