//! Arena Slot Records and Lookup Results
//!
//! Every cache owns exactly `capacity` slots for its whole lifetime. A slot is
//! never allocated or freed after construction; whether it is "live" is decided
//! solely by the hash index pointing at it. This module holds the per-slot
//! record ([`Slot`]) and the small result types returned by read operations.
//!
//! # Slot States
//!
//! ```text
//!            set()                         clock passes deadline
//!  Empty ─────────────▶ Live(k, v, deadline) ─────────────────▶ Live-but-expired
//!    ▲                        │                                      │
//!    └──── delete() / overwritten by another key's set() ◀───────────┘
//! ```
//!
//! Expiry is never acted upon eagerly. An expired slot stays structurally live
//! until it is deleted or reused; only the read-time comparison against the
//! clock changes what callers observe.

use core::time::Duration;
use std::time::Instant;

/// Computes the absolute deadline for a TTL given at `set` time.
///
/// A zero TTL means the entry never expires. A TTL too large to be
/// represented as an `Instant` is treated the same way.
#[inline]
pub(crate) fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        now.checked_add(ttl)
    }
}

/// A single arena slot: key, value, absolute deadline and its own index.
///
/// The sentinel node of the arena list also carries a `Slot`; it is never
/// filled.
pub(crate) struct Slot<K, V> {
    key: Option<K>,
    value: Option<V>,
    expires: Option<Instant>,
    index: usize,
}

impl<K, V> Slot<K, V> {
    pub(crate) fn empty(index: usize) -> Self {
        Slot {
            key: None,
            value: None,
            expires: None,
            index,
        }
    }

    /// Position of this slot in the arena.
    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.key.is_none()
    }

    #[inline]
    pub(crate) fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    #[inline]
    pub(crate) fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Returns true if the slot has a deadline and `now` is at or past it.
    #[inline]
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expires, Some(deadline) if now >= deadline)
    }

    /// Time left before the deadline, `None` if the slot never expires.
    ///
    /// Already expired slots report `Duration::ZERO`.
    #[inline]
    pub(crate) fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.expires
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Overwrites the slot with a new key, returning the key it held before.
    pub(crate) fn fill(&mut self, key: K, value: V, expires: Option<Instant>) -> Option<K> {
        let previous = self.key.replace(key);
        self.value = Some(value);
        self.expires = expires;
        previous
    }

    /// Replaces value and deadline of a live slot, keeping its key.
    pub(crate) fn update(&mut self, value: V, expires: Option<Instant>) {
        self.value = Some(value);
        self.expires = expires;
    }

    /// Returns the slot to the empty state, handing back the key it held.
    pub(crate) fn reset(&mut self) -> Option<K> {
        self.value = None;
        self.expires = None;
        self.key.take()
    }
}

/// A value found by a read operation.
///
/// Expired entries are still returned by [`Cache::get`](crate::Cache::get)
/// and friends; `expired` tells the caller whether the deadline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lookup<V> {
    /// The stored value.
    pub value: V,
    /// Whether the entry's deadline had passed at lookup time.
    pub expired: bool,
}

impl<V> Lookup<V> {
    /// Returns the value if the entry had not expired.
    #[inline]
    pub fn fresh(self) -> Option<V> {
        if self.expired {
            None
        } else {
            Some(self.value)
        }
    }

    /// Discards the expiry flag.
    #[inline]
    pub fn into_value(self) -> V {
        self.value
    }
}

/// The result of an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    /// No entry is stored under the key.
    Absent,
    /// The entry exists and has not expired.
    Live,
    /// The entry exists but its deadline has passed.
    Expired,
}

impl Presence {
    /// True for both live and expired entries.
    #[inline]
    pub fn exists(self) -> bool {
        !matches!(self, Presence::Absent)
    }

    /// True only for entries whose deadline has passed.
    #[inline]
    pub fn is_expired(self) -> bool {
        matches!(self, Presence::Expired)
    }
}
