#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Read and Write Paths
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  get / get_not_stale / get_with_ttl / get_with / mget                │
//! │      shared lock ─▶ index lookup ─▶ clone / inspect value            │
//! │                   └▶ live hit: record slot in promotion buffer       │
//! │                         buffer full? ─▶ swap, then flush under the   │
//! │                                         exclusive lock               │
//! │                                                                      │
//! │  get_quiet / has                                                     │
//! │      shared lock ─▶ index lookup, no promotion                       │
//! │                                                                      │
//! │  set / mset / delete / mdelete / clear / flush_promotions            │
//! │      exclusive lock ─▶ index + arena list surgery                    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Description | Best Use Case |
//! |------|-------------|---------------|
//! | [`Cache`] | One lock, one arena | Moderate contention, strictest LRU order |
//! | [`ShardedCache`] | N independent `Cache`s | Many threads, large keyspaces |
//!
//! ## Performance Characteristics
//!
//! | Operation | Lock | Cost | Allocates |
//! |-----------|------|------|-----------|
//! | `get`     | shared | O(1) + one atomic claim | no (amortized buffer flush) |
//! | `set`     | exclusive | O(1) | no, once the key is cached |
//! | `delete`  | exclusive | O(1) | no |
//! | `mget`    | shared, once per shard | O(k) | result vector |
//!
//! ## Expiry
//!
//! TTLs are given per `set` and stored as absolute deadlines. Nothing is ever
//! evicted because it expired: expired entries are still returned, flagged,
//! until their slot is reused or they are deleted.
//!
//! ```rust
//! use promocache::{Cache, Presence};
//! use std::time::Duration;
//!
//! let cache = Cache::new(16);
//! cache.set("session", 7, Duration::from_nanos(1));
//! std::thread::sleep(Duration::from_millis(1));
//!
//! assert_eq!(cache.get_not_stale(&"session"), None);
//! assert_eq!(cache.has(&"session"), Presence::Expired);
//! assert!(cache.get(&"session").is_some_and(|hit| hit.expired));
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: the single-lock TTL-aware LRU cache
//! - [`sharded`]: hash-partitioned set of caches
//! - [`entry`]: lookup result types
//! - [`config`]: configuration structures and validation errors
//! - [`metrics`]: counters and the metrics reporting trait

/// Slot records and read results.
pub mod entry;

/// Fixed-arena circular list of slots, addressed by index.
pub(crate) mod list;

/// Batched promotion buffers and their pool.
pub(crate) mod promotion;

/// Cache configuration structures.
///
/// Provides configuration for single and sharded caches, and the error type
/// returned when a configuration is rejected.
pub mod config;

/// Cache metrics system.
///
/// Relaxed atomic counters kept by every cache, their snapshots, and a common
/// reporting interface.
pub mod metrics;

/// TTL-aware LRU cache with batched promotions.
pub mod cache;

/// Hash-sharded cache.
///
/// Partitions the keyspace across independent [`Cache`] instances, each with
/// its own lock, so that threads working on different keys rarely contend.
pub mod sharded;

// Re-export cache types
pub use cache::Cache;
pub use sharded::ShardedCache;

// Re-export result and config types
pub use config::{CacheConfig, ConfigError, ShardedCacheConfig, MAX_SHARDS};
pub use entry::{Lookup, Presence};
pub use metrics::{CacheMetrics, CoreCacheMetrics};

pub use promotion::{DEFAULT_PROMOTION_BUFFER, MAX_PROMOTION_BUFFER};
