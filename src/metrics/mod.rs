//! Cache Metrics System
//!
//! Every cache keeps a set of relaxed atomic counters ([`CacheStats`]) that are
//! bumped from both the shared-lock read path and the exclusive-lock write
//! path. A point-in-time copy ([`CoreCacheMetrics`]) can be taken at any
//! moment and reported through the [`CacheMetrics`] trait as a `BTreeMap`.
//!
//! # Why BTreeMap over HashMap?
//!
//! BTreeMap gives deterministic ordering of metric names, which keeps reports
//! and test output stable. With a dozen keys the lookup cost is irrelevant.
//!
//! Counters are independent of each other and are not read atomically as a
//! group, so a snapshot taken under load can be off by in-flight operations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter values copied out of a cache at one point in time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoreCacheMetrics {
    /// Total number of read requests that consulted the hash index.
    pub requests: u64,

    /// Reads that found the key, expired or not.
    pub cache_hits: u64,

    /// Hits whose entry had already passed its deadline.
    pub expired_hits: u64,

    /// New keys written into a slot.
    pub insertions: u64,

    /// Writes to a key that was already present.
    pub updates: u64,

    /// Live keys displaced because their slot was reused for another key.
    pub evictions: u64,

    /// Keys removed by `delete` / `mdelete`.
    pub deletions: u64,

    /// Promotions appended to a promotion buffer.
    pub promotions_recorded: u64,

    /// Promotions applied to the list after deduplication.
    pub promotions_applied: u64,

    /// Promotion buffers flushed.
    pub flushes: u64,
}

impl CoreCacheMetrics {
    /// Number of reads that did not find the key.
    pub fn cache_misses(&self) -> u64 {
        self.requests.saturating_sub(self.cache_hits)
    }

    /// Ratio of hits to requests, 0.0 if nothing was requested.
    pub fn hit_rate(&self) -> f64 {
        if self.requests > 0 {
            self.cache_hits as f64 / self.requests as f64
        } else {
            0.0
        }
    }

    /// Ratio of deduplicated to recorded promotions, 0.0 if nothing was flushed.
    pub fn promotion_dedup_ratio(&self) -> f64 {
        if self.promotions_recorded > 0 {
            self.promotions_applied as f64 / self.promotions_recorded as f64
        } else {
            0.0
        }
    }

    /// Adds another snapshot's counters to this one.
    pub fn merge(&mut self, other: &CoreCacheMetrics) {
        self.requests += other.requests;
        self.cache_hits += other.cache_hits;
        self.expired_hits += other.expired_hits;
        self.insertions += other.insertions;
        self.updates += other.updates;
        self.evictions += other.evictions;
        self.deletions += other.deletions;
        self.promotions_recorded += other.promotions_recorded;
        self.promotions_applied += other.promotions_applied;
        self.flushes += other.flushes;
    }

    /// Converts the snapshot to a name → value map with stable ordering.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        metrics.insert("cache_hits".to_string(), self.cache_hits as f64);
        metrics.insert("cache_misses".to_string(), self.cache_misses() as f64);
        metrics.insert("deletions".to_string(), self.deletions as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("expired_hits".to_string(), self.expired_hits as f64);
        metrics.insert("flushes".to_string(), self.flushes as f64);
        metrics.insert("insertions".to_string(), self.insertions as f64);
        metrics.insert(
            "promotions_applied".to_string(),
            self.promotions_applied as f64,
        );
        metrics.insert(
            "promotions_recorded".to_string(),
            self.promotions_recorded as f64,
        );
        metrics.insert("requests".to_string(), self.requests as f64);
        metrics.insert("updates".to_string(), self.updates as f64);

        metrics.insert("hit_rate".to_string(), self.hit_rate());
        metrics.insert(
            "promotion_dedup_ratio".to_string(),
            self.promotion_dedup_ratio(),
        );

        metrics
    }
}

/// Live counters owned by a cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    expired_hits: AtomicU64,
    insertions: AtomicU64,
    updates: AtomicU64,
    evictions: AtomicU64,
    deletions: AtomicU64,
    promotions_recorded: AtomicU64,
    promotions_applied: AtomicU64,
    flushes: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl CacheStats {
    #[inline]
    pub(crate) fn record_miss(&self) {
        bump(&self.requests, 1);
    }

    #[inline]
    pub(crate) fn record_hit(&self, expired: bool) {
        bump(&self.requests, 1);
        bump(&self.cache_hits, 1);
        if expired {
            bump(&self.expired_hits, 1);
        }
    }

    #[inline]
    pub(crate) fn record_insertion(&self) {
        bump(&self.insertions, 1);
    }

    #[inline]
    pub(crate) fn record_update(&self) {
        bump(&self.updates, 1);
    }

    #[inline]
    pub(crate) fn record_eviction(&self) {
        bump(&self.evictions, 1);
    }

    #[inline]
    pub(crate) fn record_deletions(&self, count: usize) {
        bump(&self.deletions, count as u64);
    }

    #[inline]
    pub(crate) fn record_promotion(&self) {
        bump(&self.promotions_recorded, 1);
    }

    pub(crate) fn record_flush(&self, applied: usize) {
        bump(&self.flushes, 1);
        bump(&self.promotions_applied, applied as u64);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> CoreCacheMetrics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CoreCacheMetrics {
            requests: load(&self.requests),
            cache_hits: load(&self.cache_hits),
            expired_hits: load(&self.expired_hits),
            insertions: load(&self.insertions),
            updates: load(&self.updates),
            evictions: load(&self.evictions),
            deletions: load(&self.deletions),
            promotions_recorded: load(&self.promotions_recorded),
            promotions_applied: load(&self.promotions_applied),
            flushes: load(&self.flushes),
        }
    }
}

/// Uniform metrics reporting for every cache type in this crate.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Short identifier of the cache implementation.
    fn algorithm_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats = CacheStats::default();
        stats.record_hit(false);
        stats.record_hit(true);
        stats.record_miss();
        stats.record_insertion();
        stats.record_update();
        stats.record_eviction();
        stats.record_deletions(2);
        stats.record_promotion();
        stats.record_promotion();
        stats.record_flush(1);

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 3);
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses(), 1);
        assert_eq!(snap.expired_hits, 1);
        assert_eq!(snap.deletions, 2);
        assert_eq!(snap.flushes, 1);
        assert!((snap.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
        assert!((snap.promotion_dedup_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_rates() {
        let snap = CoreCacheMetrics::default();
        assert_eq!(snap.hit_rate(), 0.0);
        assert_eq!(snap.promotion_dedup_ratio(), 0.0);
    }

    #[test]
    fn test_merge_and_btreemap() {
        let mut total = CoreCacheMetrics {
            requests: 4,
            cache_hits: 3,
            ..Default::default()
        };
        total.merge(&CoreCacheMetrics {
            requests: 6,
            cache_hits: 1,
            evictions: 2,
            ..Default::default()
        });
        assert_eq!(total.requests, 10);
        assert_eq!(total.cache_hits, 4);

        let map = total.to_btreemap();
        assert_eq!(map.get("cache_misses"), Some(&6.0));
        assert_eq!(map.get("evictions"), Some(&2.0));
        assert_eq!(map.get("hit_rate"), Some(&0.4));
        let keys: Vec<_> = map.keys().cloned().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
