//! TTL-Aware LRU Cache with Batched Promotions
//!
//! [`Cache`] is a fixed-capacity, thread-safe LRU cache. All `capacity` slots
//! are allocated at construction and recycled forever after; a `set` on a new
//! key takes over the least recently used slot, evicting whatever it held.
//!
//! # How It Works
//!
//! ```text
//! ┌──────────────────────────── Cache ─────────────────────────────┐
//! │                                                                │
//! │   RwLock ┌──────────────────────────────────────────────────┐  │
//! │          │ index: HashMap<K, slot>                          │  │
//! │          │ list:  [sentinel] ⇄ [MRU] ⇄ ... ⇄ [LRU]          │  │
//! │          │ promotions: active PromotionBuffer ──┐           │  │
//! │          └──────────────────────────────────────┼───────────┘  │
//! │                                                 │              │
//! │   get()  ── shared lock ── index lookup ── append slot (atomic) │
//! │   set()  ── exclusive lock ── update / reuse back slot ── front │
//! │   flush  ── exclusive lock ── dedup batch ── move_to_front ...  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads never take the exclusive lock themselves. They record the slot they
//! touched in the promotion buffer and only the reader that fills the buffer
//! goes on to apply the whole batch.
//!
//! ## Trade-offs
//!
//! LRU order is only eventually consistent with reads. A promotion sitting in
//! the active buffer does not influence which slot the next `set` reuses. Call
//! [`Cache::flush_promotions`] when deterministic ordering matters (tests).
//!
//! Reads of an entry whose deadline has passed return it flagged as expired
//! but do not promote it, so stale entries drift towards reuse.
//!
//! # Example
//!
//! ```
//! use promocache::Cache;
//! use std::time::Duration;
//!
//! let cache = Cache::new(3);
//! cache.set("a", 1, Duration::ZERO);
//! cache.set("b", 2, Duration::ZERO);
//! cache.set("c", 3, Duration::ZERO);
//!
//! cache.get(&"a");
//! cache.flush_promotions();
//!
//! cache.set("d", 4, Duration::ZERO); // reuses b's slot
//! assert!(cache.get(&"b").is_none());
//! assert_eq!(cache.get_not_stale(&"a"), Some(1));
//! ```

use crate::config::{CacheConfig, ConfigError};
use crate::entry::{deadline, Lookup, Presence, Slot};
use crate::list::ArenaList;
use crate::metrics::{CacheMetrics, CacheStats, CoreCacheMetrics};
use crate::promotion::{ActiveBuffer, BufferPool, FullBuffer, PromotionBuffer};
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use core::num::NonZeroUsize;
use core::time::Duration;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

#[cfg(feature = "hashbrown")]
use hashbrown::DefaultHashBuilder;
#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;

#[cfg(not(feature = "hashbrown"))]
use std::collections::hash_map::RandomState as DefaultHashBuilder;
#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

/// Everything guarded by the cache lock.
///
/// Invariant: `index[k] == i` iff `list.entry(i).key() == Some(k)`.
struct State<K, V, S> {
    index: HashMap<K, usize, S>,
    list: ArenaList<K, V>,
    promotions: ActiveBuffer,
}

impl<K: Hash + Eq + Clone, V, S: BuildHasher> State<K, V, S> {
    fn insert(&mut self, key: K, value: V, expires: Option<Instant>, stats: &CacheStats) {
        if let Some(&idx) = self.index.get(&key) {
            self.list.entry_mut(idx).update(value, expires);
            self.list.move_to_front(idx);
            stats.record_update();
            return;
        }

        let idx = self.list.back();
        if let Some(evicted) = self.list.entry_mut(idx).fill(key.clone(), value, expires) {
            self.index.remove(&evicted);
            stats.record_eviction();
            trace!(slot = idx, "evicted least recently used entry");
        }
        self.index.insert(key, idx);
        self.list.move_to_front(idx);
        stats.record_insertion();
    }

    fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.index.remove(key) {
            Some(idx) => {
                debug_assert!(self.list.entry(idx).key().is_some());
                self.list.entry_mut(idx).reset();
                self.list.move_to_back(idx);
                true
            }
            None => false,
        }
    }

    /// Applies every promotion recorded in the active buffer.
    fn flush_active(&mut self, stats: &CacheStats) {
        let State {
            list, promotions, ..
        } = self;
        apply_promotions(list, promotions.get_mut(), stats);
    }
}

fn apply_promotions<K, V>(
    list: &mut ArenaList<K, V>,
    buffer: &mut PromotionBuffer,
    stats: &CacheStats,
) {
    let recorded = buffer.pending();
    if recorded == 0 {
        return;
    }
    // A slot emptied by `delete` after it was read keeps its place at the back.
    let applied = buffer.drain(|idx| {
        if !list.entry(idx).is_empty() {
            list.move_to_front(idx);
        }
    });
    stats.record_flush(applied);
    trace!(
        recorded,
        applied,
        buffer_len = buffer.len(),
        "applied promotion batch"
    );
}

/// A fixed-capacity, TTL-aware LRU cache safe to share between threads.
///
/// See the [module documentation](self) for the locking model.
///
/// # Type Parameters
///
/// - `K`: Key type. Stored twice (index and slot), hence `Clone`.
/// - `V`: Value type. Read accessors that return owned values need `Clone`;
///   [`get_with`](Self::get_with) does not.
/// - `S`: Hash builder for the index. Defaults to a randomly seeded hasher.
pub struct Cache<K, V, S = DefaultHashBuilder> {
    state: RwLock<State<K, V, S>>,
    pool: Arc<BufferPool>,
    stats: CacheStats,
    capacity: NonZeroUsize,
}

impl<K, V> Cache<K, V, DefaultHashBuilder>
where
    K: Hash + Eq + Clone,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let Some(capacity) = NonZeroUsize::new(capacity) else {
            panic!("cache capacity must be at least 1");
        };
        Self::init(CacheConfig::new(capacity), None)
    }

    /// Creates a cache from a configuration with an optional hasher.
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not validate.
    pub fn init(config: CacheConfig, hasher: Option<DefaultHashBuilder>) -> Self {
        Self::with_hasher(config, hasher.unwrap_or_default())
    }

    /// Like [`init`](Self::init) but returns configuration errors.
    pub fn try_init(
        config: CacheConfig,
        hasher: Option<DefaultHashBuilder>,
    ) -> Result<Self, ConfigError> {
        Self::try_with_hasher(config, hasher.unwrap_or_default())
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    /// Creates a cache with a custom hash builder for its index.
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not validate.
    pub fn with_hasher(config: CacheConfig, hash_builder: S) -> Self {
        match Self::try_with_hasher(config, hash_builder) {
            Ok(cache) => cache,
            Err(err) => panic!("invalid cache configuration: {err}"),
        }
    }

    /// Like [`with_hasher`](Self::with_hasher) but returns configuration errors.
    pub fn try_with_hasher(config: CacheConfig, hash_builder: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = Arc::new(BufferPool::new(config.promotion_buffer_len()));
        Ok(Self::with_pool(config.capacity, hash_builder, pool))
    }

    /// Builds a cache drawing its promotion buffers from a shared pool.
    pub(crate) fn with_pool(
        capacity: NonZeroUsize,
        hash_builder: S,
        pool: Arc<BufferPool>,
    ) -> Self {
        debug!(
            capacity = capacity.get(),
            promotion_buffer = pool.buffer_len(),
            "creating cache"
        );
        let state = State {
            index: HashMap::with_capacity_and_hasher(capacity.get(), hash_builder),
            list: ArenaList::new(capacity),
            promotions: ActiveBuffer::new(pool.acquire()),
        };
        Cache {
            state: RwLock::new(state),
            pool,
            stats: CacheStats::default(),
            capacity,
        }
    }

    /// Maximum number of live entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of live keys (expired entries included until reused or deleted).
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    /// Returns `true` if no key is stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().index.is_empty()
    }

    /// Shared-lock lookup that hands the slot to `read`.
    ///
    /// With `promote` set the lookup counts as a request and live hits are
    /// recorded for promotion. If that fills the promotion buffer, the batch
    /// is flushed after the shared lock has been released. Inspections
    /// (`promote == false`) leave the counters untouched.
    ///
    /// `read` runs before the promotion is recorded, so a panicking closure
    /// cannot strand a swapped-out buffer.
    fn lookup<Q, R>(
        &self,
        key: &Q,
        promote: bool,
        read: impl FnOnce(&Slot<K, V>, Instant) -> R,
    ) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let now = Instant::now();
        let (result, full) = {
            let state = self.state.read();
            let Some(&idx) = state.index.get(key) else {
                if promote {
                    self.stats.record_miss();
                }
                return None;
            };
            let slot = state.list.entry(idx);
            let expired = slot.is_expired_at(now);
            let result = read(slot, now);
            if !promote {
                return Some(result);
            }
            self.stats.record_hit(expired);
            let full = if expired {
                None
            } else {
                self.stats.record_promotion();
                state.promotions.record(idx, &self.pool)
            };
            (result, full)
        };
        if let Some(full) = full {
            self.flush_full(full);
        }
        Some(result)
    }

    /// Applies a buffer swapped out by a reader and returns it to the pool.
    fn flush_full(&self, full: FullBuffer) {
        let mut state = self.state.write();
        // SAFETY: the exclusive lock is held, so every reader that could have
        // claimed a cell in this buffer has finished.
        let mut buffer = unsafe { full.into_box() };
        apply_promotions(&mut state.list, &mut buffer, &self.stats);
        drop(state);
        self.pool.release(buffer);
    }

    /// Looks up `key` and promotes it if it has not expired.
    ///
    /// Returns the value together with its expiry flag, or `None` if absent.
    pub fn get<Q>(&self, key: &Q) -> Option<Lookup<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.lookup(key, true, read_lookup)
    }

    /// Same as [`get`](Self::get) but never promotes the entry.
    pub fn get_quiet<Q>(&self, key: &Q) -> Option<Lookup<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.lookup(key, false, read_lookup)
    }

    /// Returns the value only if it exists and has not expired.
    pub fn get_not_stale<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.get(key).and_then(Lookup::fresh)
    }

    /// Returns the value and the time left before it expires.
    ///
    /// The remaining TTL is `None` for entries that never expire and
    /// `Some(Duration::ZERO)` for entries that already have.
    pub fn get_with_ttl<Q>(&self, key: &Q) -> Option<(V, Option<Duration>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.lookup(key, true, |slot, now| {
            (slot_value(slot).clone(), slot.remaining_at(now))
        })
    }

    /// Applies `f` to the value while holding the shared lock, avoiding a
    /// clone. Promotes like [`get`](Self::get).
    ///
    /// `f` must not call back into this cache.
    pub fn get_with<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V, bool) -> R,
    {
        self.lookup(key, true, |slot, now| {
            f(slot_value(slot), slot.is_expired_at(now))
        })
    }

    /// Checks for `key` without reading the value or promoting it.
    pub fn has<Q>(&self, key: &Q) -> Presence
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let presence = self.lookup(key, false, |slot, now| {
            if slot.is_expired_at(now) {
                Presence::Expired
            } else {
                Presence::Live
            }
        });
        presence.unwrap_or(Presence::Absent)
    }

    /// Looks up many keys under a single shared lock acquisition.
    ///
    /// Results are in input order; live hits are promoted.
    pub fn mget<'a, Q, I>(&self, keys: I) -> Vec<Option<Lookup<V>>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + 'a,
        I: IntoIterator<Item = &'a Q>,
        V: Clone,
    {
        let now = Instant::now();
        let mut swapped = Vec::new();
        let found = {
            let state = self.state.read();
            // Values are cloned before any promotion is recorded
            let found: Vec<Option<(usize, Lookup<V>)>> = keys
                .into_iter()
                .map(|key| {
                    let &idx = state.index.get(key)?;
                    Some((idx, read_lookup(state.list.entry(idx), now)))
                })
                .collect();
            for hit in &found {
                match hit {
                    None => self.stats.record_miss(),
                    Some((idx, lookup)) => {
                        self.stats.record_hit(lookup.expired);
                        if !lookup.expired {
                            self.stats.record_promotion();
                            swapped.extend(state.promotions.record(*idx, &self.pool));
                        }
                    }
                }
            }
            found
        };
        for full in swapped {
            self.flush_full(full);
        }
        found
            .into_iter()
            .map(|hit| hit.map(|(_, lookup)| lookup))
            .collect()
    }

    /// Stores `value` under `key`.
    ///
    /// A zero `ttl` means the entry never expires. If the key is new and the
    /// cache is full, the least recently used entry is evicted.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expires = deadline(Instant::now(), ttl);
        self.state.write().insert(key, value, expires, &self.stats);
    }

    /// Stores many entries with the same TTL under one exclusive lock.
    pub fn mset<I>(&self, entries: I, ttl: Duration)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let expires = deadline(Instant::now(), ttl);
        let mut state = self.state.write();
        for (key, value) in entries {
            state.insert(key, value, expires, &self.stats);
        }
    }

    /// Removes `key`. Returns whether it was present; absent keys are a no-op.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let removed = self.state.write().remove(key);
        if removed {
            self.stats.record_deletions(1);
        }
        removed
    }

    /// Removes many keys under one exclusive lock, returning how many existed.
    pub fn mdelete<'a, Q, I>(&self, keys: I) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let mut state = self.state.write();
        let removed = keys.into_iter().filter(|key| state.remove(*key)).count();
        drop(state);
        self.stats.record_deletions(removed);
        removed
    }

    /// Applies all pending promotions now.
    pub fn flush_promotions(&self) {
        self.state.write().flush_active(&self.stats);
    }

    /// Removes every entry and discards pending promotions.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.index.clear();
        state.list.reset_all();
        state.promotions.get_mut().reset();
        debug!(capacity = self.capacity.get(), "cleared cache");
    }

    /// Copies the current counters.
    pub fn stats(&self) -> CoreCacheMetrics {
        self.stats.snapshot()
    }
}

fn slot_value<K, V>(slot: &Slot<K, V>) -> &V {
    match slot.value() {
        Some(value) => value,
        None => unreachable!("indexed slot {} holds no value", slot.index()),
    }
}

fn read_lookup<K, V: Clone>(slot: &Slot<K, V>, now: Instant) -> Lookup<V> {
    Lookup {
        value: slot_value(slot).clone(),
        expired: slot.is_expired_at(now),
    }
}

impl<K, V, S> CacheMetrics for Cache<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = self.stats.snapshot().to_btreemap();
        metrics.insert("capacity".to_string(), self.capacity() as f64);
        metrics.insert("len".to_string(), self.len() as f64);
        metrics
    }

    fn algorithm_name(&self) -> &'static str {
        "LRU"
    }
}

impl<K, V, S> core::fmt::Debug for Cache<K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Cache")
            .field("capacity", &self.capacity)
            .field("len", &state.index.len())
            .field("list", &state.list)
            .field("pool", &self.pool)
            .finish()
    }
}
