//! Cache Configuration
//!
//! Configuration structs have public fields for simple instantiation, plus a
//! `new` shorthand that fills in defaults.
//!
//! | Config | Cache |
//! |--------|-------|
//! | [`CacheConfig`] | [`Cache`](crate::Cache) |
//! | [`ShardedCacheConfig`] | [`ShardedCache`](crate::ShardedCache) |
//!
//! Capacity is a `NonZeroUsize`, so a zero-capacity cache cannot be described
//! at all. The remaining constraints (non-zero shard count, a sane promotion
//! buffer length) are checked by `validate`, which the cache constructors call.
//! The panicking constructors treat a validation failure as a programmer
//! error; the `try_*` constructors hand the [`ConfigError`] back instead.
//!
//! # Examples
//!
//! ```
//! use promocache::config::{CacheConfig, ShardedCacheConfig};
//! use core::num::NonZeroUsize;
//!
//! let single = CacheConfig::new(NonZeroUsize::new(10_000).unwrap());
//! assert!(single.validate().is_ok());
//!
//! // 16 shards of 1 000 entries each
//! let sharded = ShardedCacheConfig::new(16, NonZeroUsize::new(1_000).unwrap());
//! assert_eq!(sharded.shard_count(), 16);
//! ```

use crate::promotion::{DEFAULT_PROMOTION_BUFFER, MAX_PROMOTION_BUFFER};
use core::fmt;
use core::num::NonZeroUsize;
use thiserror::Error;

/// Largest shard count a [`ShardedCacheConfig`] accepts.
pub const MAX_SHARDS: usize = 1 << (usize::BITS - 1);

/// Rejected cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A sharded cache needs at least one shard.
    #[error("shard count must be at least 1")]
    ZeroShards,
    /// The shard count cannot be rounded up to a power of two.
    #[error("shard count {requested} exceeds the maximum of {max}")]
    TooManyShards {
        /// Shard count that was asked for.
        requested: usize,
        /// Largest accepted shard count.
        max: usize,
    },
    /// A promotion buffer needs room for at least one promotion.
    #[error("promotion buffer length must be at least 1")]
    ZeroPromotionBuffer,
    /// The promotion buffer would exceed [`MAX_PROMOTION_BUFFER`] cells.
    #[error("promotion buffer length {requested} exceeds the maximum of {max}")]
    PromotionBufferTooLarge {
        /// Length that was asked for.
        requested: usize,
        /// Largest accepted length.
        max: usize,
    },
}

/// Configuration for a single [`Cache`](crate::Cache).
///
/// # Fields
///
/// - `capacity`: number of arena slots, i.e. the maximum number of live keys.
///   All slots are allocated up front.
/// - `promotion_buffer`: how many reads are batched before their promotions
///   are applied to the LRU list. Rounded up to a power of two.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    pub capacity: NonZeroUsize,
    /// Pending promotions held before a flush.
    pub promotion_buffer: usize,
}

impl CacheConfig {
    /// Creates a config with the default promotion buffer length.
    pub fn new(capacity: NonZeroUsize) -> Self {
        CacheConfig {
            capacity,
            promotion_buffer: DEFAULT_PROMOTION_BUFFER,
        }
    }

    /// Checks the promotion buffer length.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.promotion_buffer {
            0 => Err(ConfigError::ZeroPromotionBuffer),
            len if len > MAX_PROMOTION_BUFFER => Err(ConfigError::PromotionBufferTooLarge {
                requested: len,
                max: MAX_PROMOTION_BUFFER,
            }),
            _ => Ok(()),
        }
    }

    /// Effective promotion buffer length (next power of two).
    pub fn promotion_buffer_len(&self) -> usize {
        self.promotion_buffer.next_power_of_two()
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("capacity", &self.capacity)
            .field("promotion_buffer", &self.promotion_buffer)
            .finish()
    }
}

/// Configuration for a [`ShardedCache`](crate::ShardedCache).
///
/// # Sizing Note
///
/// Unlike a single-cache config, `base.capacity` here is the capacity of
/// **each** shard. The total capacity is `shard_count() * base.capacity`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShardedCacheConfig {
    /// Per-shard cache configuration.
    pub base: CacheConfig,
    /// Requested number of shards, rounded up to a power of two.
    pub shards: usize,
}

impl ShardedCacheConfig {
    /// Creates a config for `shards` shards of `capacity_per_shard` entries.
    pub fn new(shards: usize, capacity_per_shard: NonZeroUsize) -> Self {
        ShardedCacheConfig {
            base: CacheConfig::new(capacity_per_shard),
            shards,
        }
    }

    /// Checks the shard count and the per-shard config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.shards {
            0 => return Err(ConfigError::ZeroShards),
            n if n > MAX_SHARDS => {
                return Err(ConfigError::TooManyShards {
                    requested: n,
                    max: MAX_SHARDS,
                })
            }
            _ => {}
        }
        self.base.validate()
    }

    /// Effective number of shards (next power of two, capped at
    /// [`MAX_SHARDS`]).
    pub fn shard_count(&self) -> usize {
        self.shards
            .max(1)
            .checked_next_power_of_two()
            .unwrap_or(MAX_SHARDS)
    }
}

impl fmt::Debug for ShardedCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCacheConfig")
            .field("base", &self.base)
            .field("shards", &self.shards)
            .finish()
    }
}
