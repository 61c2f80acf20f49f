//! Hash-Sharded Cache
//!
//! [`ShardedCache`] partitions the keyspace across a power-of-two number of
//! independent [`Cache`] shards, each with its own `RwLock`, arena and
//! promotion buffer. Operations on keys that land in different shards never
//! contend.
//!
//! ```text
//! ┌────────────────────────── ShardedCache ───────────────────────────┐
//! │                                                                   │
//! │  hash(key) & (N - 1)  ──▶  shard selection                        │
//! │                                                                   │
//! │  ┌───────────┐ ┌───────────┐        ┌───────────┐                 │
//! │  │  Cache 0  │ │  Cache 1  │  ...   │ Cache N-1 │                 │
//! │  │  RwLock   │ │  RwLock   │        │  RwLock   │                 │
//! │  └─────┬─────┘ └─────┬─────┘        └─────┬─────┘                 │
//! │        └─────────────┴──── BufferPool ────┘                       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The routing hasher is seeded per instance. Each shard's hash index gets its
//! own `S::default()`; reusing the routing hasher there would give every key in
//! a shard the same low hash bits.
//!
//! Multi-key operations group their keys by shard and issue one batched call
//! per touched shard, so a `mget` of K keys takes at most N shared locks.
//!
//! LRU order, eviction and capacity are all per shard. A hot shard can evict
//! while a cold one still has free slots.
//!
//! # Example
//!
//! ```
//! use promocache::ShardedCache;
//! use std::time::Duration;
//!
//! let cache = ShardedCache::new(4, 256);
//! cache.mset((0..100).map(|i| (i, i * 2)), Duration::from_secs(30));
//!
//! let found = cache.mget([1, 50, 500].iter());
//! assert_eq!(found[0].map(|hit| hit.value), Some(2));
//! assert_eq!(found[1].map(|hit| hit.value), Some(100));
//! assert!(found[2].is_none());
//! ```

use crate::cache::Cache;
use crate::config::{ConfigError, ShardedCacheConfig};
use crate::entry::{Lookup, Presence};
use crate::metrics::{CacheMetrics, CoreCacheMetrics};
use crate::promotion::BufferPool;
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use core::num::NonZeroUsize;
use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "hashbrown")]
use hashbrown::DefaultHashBuilder;

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::RandomState as DefaultHashBuilder;

/// A set of independent [`Cache`] shards addressed by key hash.
///
/// # Type Parameters
///
/// - `K`: Key type. Must implement `Hash + Eq + Clone`.
/// - `V`: Value type.
/// - `S`: Hash builder used for routing and, via `Default`, for each shard's
///   index. Defaults to a randomly seeded hasher.
pub struct ShardedCache<K, V, S = DefaultHashBuilder> {
    shards: Box<[Cache<K, V, S>]>,
    hash_builder: S,
    mask: usize,
}

impl<K, V> ShardedCache<K, V, DefaultHashBuilder>
where
    K: Hash + Eq + Clone,
{
    /// Creates `shards` shards (rounded up to a power of two) holding
    /// `capacity_per_shard` entries each.
    ///
    /// # Panics
    ///
    /// Panics if either argument is zero.
    pub fn new(shards: usize, capacity_per_shard: usize) -> Self {
        let Some(capacity) = NonZeroUsize::new(capacity_per_shard) else {
            panic!("cache capacity must be at least 1");
        };
        Self::init(ShardedCacheConfig::new(shards, capacity), None)
    }

    /// Creates a sharded cache from a configuration with an optional hasher.
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not validate.
    pub fn init(config: ShardedCacheConfig, hasher: Option<DefaultHashBuilder>) -> Self {
        Self::with_hasher(config, hasher.unwrap_or_default())
    }

    /// Like [`init`](Self::init) but returns configuration errors.
    pub fn try_init(
        config: ShardedCacheConfig,
        hasher: Option<DefaultHashBuilder>,
    ) -> Result<Self, ConfigError> {
        Self::try_with_hasher(config, hasher.unwrap_or_default())
    }
}

impl<K, V, S> ShardedCache<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Default,
{
    /// Creates a sharded cache routing keys with `hash_builder`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not validate.
    pub fn with_hasher(config: ShardedCacheConfig, hash_builder: S) -> Self {
        match Self::try_with_hasher(config, hash_builder) {
            Ok(cache) => cache,
            Err(err) => panic!("invalid sharded cache configuration: {err}"),
        }
    }

    /// Like [`with_hasher`](Self::with_hasher) but returns configuration errors.
    pub fn try_with_hasher(
        config: ShardedCacheConfig,
        hash_builder: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let shard_count = config.shard_count();
        let pool = Arc::new(BufferPool::new(config.base.promotion_buffer_len()));
        debug!(
            shards = shard_count,
            capacity_per_shard = config.base.capacity.get(),
            "creating sharded cache"
        );

        let shards: Vec<_> = (0..shard_count)
            .map(|_| Cache::with_pool(config.base.capacity, S::default(), Arc::clone(&pool)))
            .collect();

        Ok(ShardedCache {
            shards: shards.into_boxed_slice(),
            hash_builder,
            mask: shard_count - 1,
        })
    }
}

impl<K, V, S> ShardedCache<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn shard_index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
    {
        (self.hash_builder.hash_one(key) as usize) & self.mask
    }

    #[inline]
    fn shard<Q>(&self, key: &Q) -> &Cache<K, V, S>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
    {
        &self.shards[self.shard_index(key)]
    }

    /// Splits `items` into one bucket per shard, remembering input positions.
    fn group<T>(
        &self,
        items: impl IntoIterator<Item = T>,
        shard_of: impl Fn(&T) -> usize,
    ) -> Vec<Vec<(usize, T)>> {
        let mut groups: Vec<Vec<(usize, T)>> =
            (0..self.shards.len()).map(|_| Vec::new()).collect();
        for (pos, item) in items.into_iter().enumerate() {
            groups[shard_of(&item)].push((pos, item));
        }
        groups
    }

    /// Number of shards (always a power of two).
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total capacity across all shards.
    pub fn capacity(&self) -> usize {
        self.shards.iter().map(Cache::capacity).sum()
    }

    /// Total number of keys across all shards.
    ///
    /// Shards are visited one after another, so under concurrent writes the
    /// sum is not a consistent snapshot.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Cache::len).sum()
    }

    /// Returns `true` if no shard holds a key.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Cache::is_empty)
    }

    /// See [`Cache::get`].
    pub fn get<Q>(&self, key: &Q) -> Option<Lookup<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.shard(key).get(key)
    }

    /// See [`Cache::get_quiet`].
    pub fn get_quiet<Q>(&self, key: &Q) -> Option<Lookup<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.shard(key).get_quiet(key)
    }

    /// See [`Cache::get_not_stale`].
    pub fn get_not_stale<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.shard(key).get_not_stale(key)
    }

    /// See [`Cache::get_with_ttl`].
    pub fn get_with_ttl<Q>(&self, key: &Q) -> Option<(V, Option<Duration>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.shard(key).get_with_ttl(key)
    }

    /// See [`Cache::get_with`].
    pub fn get_with<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V, bool) -> R,
    {
        self.shard(key).get_with(key, f)
    }

    /// See [`Cache::has`].
    pub fn has<Q>(&self, key: &Q) -> Presence
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.shard(key).has(key)
    }

    /// See [`Cache::set`].
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.shard(&key).set(key, value, ttl);
    }

    /// See [`Cache::delete`].
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.shard(key).delete(key)
    }

    /// Looks up many keys with one batched call per touched shard.
    ///
    /// Results are in input order.
    pub fn mget<'a, Q, I>(&self, keys: I) -> Vec<Option<Lookup<V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + 'a,
        I: IntoIterator<Item = &'a Q>,
        V: Clone,
    {
        let groups = self.group(keys, |key| self.shard_index(*key));
        let total: usize = groups.iter().map(Vec::len).sum();
        let mut results: Vec<Option<Lookup<V>>> = (0..total).map(|_| None).collect();

        for (shard, group) in self.shards.iter().zip(groups) {
            if group.is_empty() {
                continue;
            }
            let found = shard.mget(group.iter().map(|&(_, key)| key));
            for ((pos, _), hit) in group.into_iter().zip(found) {
                results[pos] = hit;
            }
        }
        results
    }

    /// Stores many entries with one batched call per touched shard.
    pub fn mset<I>(&self, entries: I, ttl: Duration)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let groups = self.group(entries, |(key, _)| self.shard_index(key));
        for (shard, group) in self.shards.iter().zip(groups) {
            if !group.is_empty() {
                shard.mset(group.into_iter().map(|(_, entry)| entry), ttl);
            }
        }
    }

    /// Removes many keys with one batched call per touched shard, returning how
    /// many existed.
    pub fn mdelete<'a, Q, I>(&self, keys: I) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let groups = self.group(keys, |key| self.shard_index(*key));
        self.shards
            .iter()
            .zip(groups)
            .filter(|(_, group)| !group.is_empty())
            .map(|(shard, group)| shard.mdelete(group.into_iter().map(|(_, key)| key)))
            .sum()
    }

    /// Applies pending promotions in every shard.
    pub fn flush_promotions(&self) {
        for shard in self.shards.iter() {
            shard.flush_promotions();
        }
    }

    /// Empties every shard.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.clear();
        }
    }

    /// Sum of all shards' counters.
    pub fn stats(&self) -> CoreCacheMetrics {
        let mut total = CoreCacheMetrics::default();
        for shard in self.shards.iter() {
            total.merge(&shard.stats());
        }
        total
    }
}

impl<K, V, S> CacheMetrics for ShardedCache<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = self.stats().to_btreemap();
        metrics.insert("capacity".to_string(), self.capacity() as f64);
        metrics.insert("len".to_string(), self.len() as f64);
        metrics.insert("shards".to_string(), self.shard_count() as f64);
        metrics
    }

    fn algorithm_name(&self) -> &'static str {
        "ShardedLRU"
    }
}

impl<K, V, S> core::fmt::Debug for ShardedCache<K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShardedCache")
            .field("shard_count", &self.shards.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::BuildHasherDefault;
    use std::thread;

    type Deterministic = BuildHasherDefault<DefaultHasher>;

    const NEVER: Duration = Duration::ZERO;

    #[test]
    fn test_shard_count_rounds_up() {
        let cache: ShardedCache<u32, u32> = ShardedCache::new(5, 10);
        assert_eq!(cache.shard_count(), 8);
        assert_eq!(cache.capacity(), 80);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_single_key_routing() {
        let cache = ShardedCache::new(4, 32);
        for i in 0..32 {
            cache.set(i, i * 3, NEVER);
        }
        for i in 0..32 {
            let shard = cache.shard_index(&i);
            assert_eq!(cache.shards[shard].get_quiet(&i).map(|hit| hit.value), Some(i * 3));
            assert_eq!(cache.get_not_stale(&i), Some(i * 3));
        }
        assert!(cache.delete(&7));
        assert_eq!(cache.has(&7), Presence::Absent);
        assert_eq!(cache.has(&8), Presence::Live);
    }

    #[test]
    fn test_len_sums_shards() {
        let cache = ShardedCache::new(4, 100);
        cache.mset((0..50).map(|i| (i, i)), NEVER);
        assert_eq!(cache.len(), 50);
        let per_shard: usize = cache.shards.iter().map(Cache::len).sum();
        assert_eq!(per_shard, 50);
    }

    #[test]
    fn test_mget_matches_single_gets() {
        let cache = ShardedCache::new(8, 64);
        cache.mset((0..200u64).map(|i| (i, i.to_string())), NEVER);

        let keys: Vec<u64> = (0..300).rev().collect();
        let batched = cache.mget(keys.iter());
        let single: Vec<_> = keys.iter().map(|k| cache.get_quiet(k)).collect();
        assert_eq!(batched, single);
        assert_eq!(batched.len(), keys.len());
    }

    #[test]
    fn test_mget_preserves_duplicates_and_order() {
        let cache = ShardedCache::new(2, 8);
        cache.set("a", 1, NEVER);
        cache.set("b", 2, NEVER);
        let found: Vec<_> = cache
            .mget(["b", "zz", "a", "b"].iter())
            .into_iter()
            .map(|hit| hit.map(Lookup::into_value))
            .collect();
        assert_eq!(found, vec![Some(2), None, Some(1), Some(2)]);
    }

    #[test]
    fn test_mdelete_counts_across_shards() {
        let cache = ShardedCache::new(4, 32);
        cache.mset((0..20).map(|i| (i, i)), NEVER);
        let keys: Vec<i32> = (10..30).collect();
        assert_eq!(cache.mdelete(keys.iter()), 10);
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.stats().deletions, 10);
    }

    #[test]
    fn test_custom_hasher() {
        let config = ShardedCacheConfig::new(4, NonZeroUsize::new(8).unwrap());
        let a: ShardedCache<u32, u32, Deterministic> =
            ShardedCache::with_hasher(config, Deterministic::default());
        let b: ShardedCache<u32, u32, Deterministic> =
            ShardedCache::with_hasher(config, Deterministic::default());
        for key in 0..64 {
            assert_eq!(a.shard_index(&key), b.shard_index(&key));
        }
    }

    #[test]
    fn test_try_init_zero_shards() {
        let config = ShardedCacheConfig::new(0, NonZeroUsize::new(8).unwrap());
        let result: Result<ShardedCache<u32, u32>, _> = ShardedCache::try_init(config, None);
        assert_eq!(result.err(), Some(ConfigError::ZeroShards));
    }

    #[test]
    fn test_try_init_too_many_shards() {
        let config = ShardedCacheConfig::new(usize::MAX, NonZeroUsize::new(1).unwrap());
        let result: Result<ShardedCache<u32, u32>, _> = ShardedCache::try_init(config, None);
        assert!(matches!(
            result.err(),
            Some(ConfigError::TooManyShards {
                requested: usize::MAX,
                ..
            })
        ));
    }

    #[test]
    #[should_panic(expected = "shard count must be at least 1")]
    fn test_zero_shards_panics() {
        let _cache: ShardedCache<u32, u32> = ShardedCache::new(0, 8);
    }

    #[test]
    fn test_clear_and_flush() {
        let cache = ShardedCache::new(4, 16);
        cache.mset((0..16).map(|i| (i, i)), NEVER);
        for i in 0..16 {
            cache.get(&i);
        }
        cache.flush_promotions();
        assert_eq!(cache.stats().promotions_applied, 16);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&3), None);
    }

    #[test]
    fn test_aggregated_metrics() {
        let cache = ShardedCache::new(4, 8);
        cache.set(1, 1, NEVER);
        cache.get(&1);
        cache.get(&2);
        let metrics = cache.metrics();
        assert_eq!(metrics.get("cache_hits"), Some(&1.0));
        assert_eq!(metrics.get("cache_misses"), Some(&1.0));
        assert_eq!(metrics.get("shards"), Some(&4.0));
        assert_eq!(metrics.get("capacity"), Some(&32.0));
        assert_eq!(cache.algorithm_name(), "ShardedLRU");
    }

    #[test]
    fn test_concurrent_batches() {
        let cache: Arc<ShardedCache<u64, u64>> = Arc::new(ShardedCache::new(8, 32));
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for round in 0..200u64 {
                        let base = (t * 1000 + round) % 512;
                        let keys: Vec<u64> = (base..base + 8).collect();
                        cache.mset(keys.iter().map(|&k| (k, k + 1)), NEVER);
                        for hit in cache.mget(keys.iter()).into_iter().flatten() {
                            assert!(hit.value > 0);
                        }
                        cache.mdelete(keys[..2].iter());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= cache.capacity());
    }
}
