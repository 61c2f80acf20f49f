//! Batched, Deduplicated Promotions
//!
//! Moving a slot to the front of the arena list needs the exclusive lock, but
//! reads only hold the shared lock. Instead of upgrading, readers append the
//! slot index they touched to the active [`PromotionBuffer`] and move on. The
//! buffered promotions are applied later, in one batch, by whoever holds the
//! exclusive lock.
//!
//! # Claim and Swap
//!
//! ```text
//!   reader A ─┐  fetch_add(position)      ┌────────────────────────────┐
//!   reader B ─┼──────────────────────────▶│ 3 │ 1 │ 3 │ 4 │ ... │ N-1 │ active
//!   reader C ─┘                           └────────────────────────────┘
//!
//!   claim >= N:  fresh = pool.acquire()
//!                CAS(active: full -> fresh)
//!                  won  -> drop shared lock, take exclusive lock, flush `full`,
//!                          pool.release(full)
//!                  lost -> pool.release(fresh), retry on the new active buffer
//! ```
//!
//! Every cell is written by exactly one reader (the one whose `fetch_add`
//! returned its position). Recorders only ever run under the shared lock and
//! flushes only under the exclusive lock, so once a buffer has been swapped out
//! and the exclusive lock is held, nobody else can reach it.
//!
//! # Deduplication
//!
//! A flush walks the recorded indices from newest to oldest and keeps only the
//! first sighting of each slot, using a fixed open-addressing set sized at twice
//! the buffer length. Survivors come out oldest first, so applying
//! `move_to_front` in that order leaves the most recent access at the front.

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use parking_lot::Mutex;

/// Default number of pending promotions a buffer holds before it is flushed.
pub const DEFAULT_PROMOTION_BUFFER: usize = 1024;

/// Largest accepted promotion buffer length.
pub const MAX_PROMOTION_BUFFER: usize = 1 << 20;

/// Idle buffers a pool keeps around for reuse.
const MAX_IDLE_BUFFERS: usize = 16;

/// 2^64 / golden ratio.
const FIBONACCI: u64 = 0x9E37_79B9_7F4A_7C15;

/// A bounded batch of pending "this slot was just read" events.
pub(crate) struct PromotionBuffer {
    cells: Box<[AtomicUsize]>,
    position: AtomicUsize,
    /// Open-addressing set used while flushing; values are biased by +1.
    seen: Box<[usize]>,
    shift: u32,
}

impl PromotionBuffer {
    /// Creates a buffer of `len` cells. `len` must be a power of two.
    pub(crate) fn new(len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        let seen_len = len * 2;
        PromotionBuffer {
            cells: (0..len).map(|_| AtomicUsize::new(0)).collect(),
            position: AtomicUsize::new(0),
            seen: vec![0; seen_len].into_boxed_slice(),
            shift: u64::BITS - seen_len.trailing_zeros(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    /// Claims the next cell and stores `slot` in it.
    ///
    /// Returns `false` when the buffer is already full.
    #[inline]
    pub(crate) fn record(&self, slot: usize) -> bool {
        let pos = self.position.fetch_add(1, Ordering::Relaxed);
        match self.cells.get(pos) {
            Some(cell) => {
                cell.store(slot, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Number of recorded promotions, capped at the buffer length.
    pub(crate) fn pending(&mut self) -> usize {
        (*self.position.get_mut()).min(self.cells.len())
    }

    /// Deduplicates the recorded indices and feeds them to `apply`, oldest
    /// surviving access first, then empties the buffer.
    ///
    /// Returns the number of indices handed to `apply`.
    pub(crate) fn drain(&mut self, mut apply: impl FnMut(usize)) -> usize {
        let recorded = self.pending();
        self.seen.fill(0);

        // Compact survivors towards the end, newest last. `write` never drops
        // below the read position so the scan never reads a rewritten cell.
        let mut write = recorded;
        for read in (0..recorded).rev() {
            let slot = *self.cells[read].get_mut();
            if insert(&mut self.seen, self.shift, slot) {
                write -= 1;
                *self.cells[write].get_mut() = slot;
            }
        }

        for cell in &mut self.cells[write..recorded] {
            apply(*cell.get_mut());
        }

        *self.position.get_mut() = 0;
        recorded - write
    }

    /// Discards any recorded promotions.
    pub(crate) fn reset(&mut self) {
        *self.position.get_mut() = 0;
    }
}

/// Adds `slot` to the set, returning `false` if it was already present.
#[allow(clippy::cast_possible_truncation)]
fn insert(seen: &mut [usize], shift: u32, slot: usize) -> bool {
    let biased = slot.wrapping_add(1);
    let mask = seen.len() - 1;
    // The shifted product is below `seen.len()`, so the cast cannot truncate.
    let mut bucket = ((slot as u64).wrapping_mul(FIBONACCI) >> shift) as usize;
    loop {
        match seen[bucket] {
            0 => {
                seen[bucket] = biased;
                return true;
            }
            stored if stored == biased => return false,
            _ => bucket = (bucket + 1) & mask,
        }
    }
}

impl fmt::Debug for PromotionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromotionBuffer")
            .field("len", &self.cells.len())
            .field("position", &self.position.load(Ordering::Relaxed))
            .finish()
    }
}

/// Acquire/release pool of equally sized promotion buffers.
///
/// One pool is shared by all shards of a sharded cache.
pub(crate) struct BufferPool {
    buffer_len: usize,
    idle: Mutex<Vec<Box<PromotionBuffer>>>,
}

impl BufferPool {
    pub(crate) fn new(buffer_len: usize) -> Self {
        BufferPool {
            buffer_len,
            idle: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Hands out an empty buffer, reusing an idle one when available.
    pub(crate) fn acquire(&self) -> Box<PromotionBuffer> {
        let reused = self.idle.lock().pop();
        reused.unwrap_or_else(|| Box::new(PromotionBuffer::new(self.buffer_len)))
    }

    /// Returns a buffer to the pool. Buffers beyond the idle limit are dropped.
    pub(crate) fn release(&self, mut buffer: Box<PromotionBuffer>) {
        buffer.reset();
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_BUFFERS {
            idle.push(buffer);
        }
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_len", &self.buffer_len)
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

/// A buffer swapped out of a cache that its owner must flush.
///
/// Only the thread that won the swap holds one, and it must take the cache's
/// exclusive lock before turning it back into a `Box`.
#[must_use = "a swapped-out promotion buffer must be flushed"]
pub(crate) struct FullBuffer(NonNull<PromotionBuffer>);

impl FullBuffer {
    /// Reclaims ownership of the buffer.
    ///
    /// # Safety
    ///
    /// The caller must hold the exclusive lock of the cache the buffer was
    /// swapped out of, so no recorder can still be writing into it.
    pub(crate) unsafe fn into_box(self) -> Box<PromotionBuffer> {
        // SAFETY: the pointer came from `Box::into_raw` in `ActiveBuffer` and
        // ownership was transferred to this handle by the winning CAS. The
        // caller guarantees no shared-lock holder can still reference it.
        unsafe { Box::from_raw(self.0.as_ptr()) }
    }
}

/// The buffer currently receiving promotions for one cache.
///
/// Lives inside the cache's lock-protected state: `record` is called through
/// a shared guard, `get_mut` through the exclusive one.
pub(crate) struct ActiveBuffer {
    current: AtomicPtr<PromotionBuffer>,
}

impl ActiveBuffer {
    pub(crate) fn new(buffer: Box<PromotionBuffer>) -> Self {
        ActiveBuffer {
            current: AtomicPtr::new(Box::into_raw(buffer)),
        }
    }

    /// Records a promotion for `slot`.
    ///
    /// If the active buffer is full, swaps in a fresh one from `pool`. The
    /// thread that wins the swap gets the full buffer back and is responsible
    /// for flushing it once it holds the exclusive lock. Must be called while
    /// holding the shared lock of the owning cache.
    pub(crate) fn record(&self, slot: usize, pool: &BufferPool) -> Option<FullBuffer> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            // SAFETY: buffers are only freed or recycled under the exclusive
            // lock, and the caller holds the shared lock, so `current` stays
            // valid for the duration of this call even if it is swapped out.
            let buffer = unsafe { &*current };
            if buffer.record(slot) {
                return None;
            }

            let fresh = Box::into_raw(pool.acquire());
            match self.current.compare_exchange(
                current,
                fresh,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // SAFETY: `fresh` is now the published active buffer and
                    // cannot be freed while we hold the shared lock.
                    let _ = unsafe { &*fresh }.record(slot);
                    return NonNull::new(current).map(FullBuffer);
                }
                Err(_) => {
                    // SAFETY: `fresh` was never published, we still own it.
                    pool.release(unsafe { Box::from_raw(fresh) });
                }
            }
        }
    }

    /// Direct access to the active buffer under the exclusive lock.
    pub(crate) fn get_mut(&mut self) -> &mut PromotionBuffer {
        // SAFETY: `&mut self` is only reachable through the exclusive guard,
        // so no recorder holds a reference to the active buffer.
        unsafe { &mut **self.current.get_mut() }
    }
}

impl Drop for ActiveBuffer {
    fn drop(&mut self) {
        // SAFETY: the pointer always originates from `Box::into_raw` and the
        // active buffer is owned exclusively by this handle.
        drop(unsafe { Box::from_raw(*self.current.get_mut()) });
    }
}

impl fmt::Debug for ActiveBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveBuffer").finish_non_exhaustive()
    }
}
