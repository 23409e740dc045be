//! Quota-guarded single-producer single-consumer ring.
//!
//! The producer owns `end`, the consumer owns `begin`. Each side publishes its
//! cursor with a release store after touching a slot, and observes the other
//! side's cursor with an acquire load:
//!
//! ```text
//! producer: write slot(end)  -> end.store(end + 1, Release)
//! consumer: end.load(Acquire) -> read slot(begin) -> begin.store(begin + 1, Release)
//! producer: begin.load(Acquire) -> slot(begin - 1) may be reused
//! ```
//!
//! Every attempt first takes its side's [`Quota`]. A second thread calling
//! the same side loses that race and gets `Busy` instead of corrupting the
//! cursor. The quota also holds the side's cached copy of the opposite
//! cursor, which is only reloaded when the cached value says there is no
//! room (producer) or nothing to read (consumer). A stale cache can only
//! under-report room, never over-report it.
//!
//! `try_push_front` and `try_pop_back` move the *opposite* side's cursor, so
//! they take both quotas and fail with `Busy` while either side is mid-call.

use core::fmt;

use allocator_api2::alloc::{Allocator, Global};

use crate::cursor::Wrap;
use crate::error::{StorageError, TryPopError, TryPushError};
use crate::quota::Quota;
use crate::storage::Slots;
use crate::sync::{AtomicUsize, CacheAligned, Ordering};
use crate::wait::{Spin, WaitStrategy};

/// A bounded ring shared by reference between one producer thread and one
/// consumer thread.
pub struct SpscRing<T, A: Allocator = Global> {
    /// Producer cursor (one past the last live element).
    end: CacheAligned<AtomicUsize>,
    /// Consumer cursor (first live element).
    begin: CacheAligned<AtomicUsize>,
    /// Producer quota; guards the cached `begin`.
    producer: CacheAligned<Quota<usize>>,
    /// Consumer quota; guards the cached `end`.
    consumer: CacheAligned<Quota<usize>>,
    wrap: Wrap,
    slots: Slots<T, A>,
}

// SAFETY: values only move in and out through the quota/cursor protocol.
unsafe impl<T: Send, A: Allocator + Send> Send for SpscRing<T, A> {}
unsafe impl<T: Send, A: Allocator + Sync> Sync for SpscRing<T, A> {}

impl<T> SpscRing<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero or too large; aborts through
    /// `handle_alloc_error` if the allocation fails.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<T, A: Allocator> SpscRing<T, A> {
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        match Self::try_with_capacity_in(capacity, alloc) {
            Ok(ring) => ring,
            Err(StorageError::AllocFailed { layout }) => alloc::alloc::handle_alloc_error(layout),
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_with_capacity_in(capacity: usize, alloc: A) -> Result<Self, StorageError> {
        let slots = Slots::try_new_in(capacity, alloc)?;
        tracing::trace!(capacity, "spsc ring allocated");
        Ok(Self {
            end: CacheAligned(AtomicUsize::new(0)),
            begin: CacheAligned(AtomicUsize::new(0)),
            producer: CacheAligned(Quota::new(0)),
            consumer: CacheAligned(Quota::new(0)),
            wrap: Wrap::new(capacity),
            slots,
        })
    }

    /// Move every cursor of a freshly built ring to `cursor` (reduced into
    /// the cursor period).
    #[doc(hidden)]
    pub fn with_cursor_origin(mut self, cursor: usize) -> Self {
        let cursor = self.wrap.normalize(cursor);
        assert!(self.is_empty(), "cursor origin can only move on an empty ring");
        self.end = CacheAligned(AtomicUsize::new(cursor));
        self.begin = CacheAligned(AtomicUsize::new(cursor));
        *self.producer.0.get_mut() = cursor;
        *self.consumer.0.get_mut() = cursor;
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    #[inline]
    pub fn cursor_period(&self) -> usize {
        self.wrap.period()
    }

    /// Number of live elements. Only a snapshot while the other side runs.
    pub fn len(&self) -> usize {
        let begin = self.begin.load(Ordering::Acquire);
        let end = self.end.load(Ordering::Acquire);
        self.wrap.distance(begin, end).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        let begin = self.begin.load(Ordering::Acquire);
        let end = self.end.load(Ordering::Acquire);
        begin == end
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Producer side: append at the back.
    pub fn try_push_back(&self, value: T) -> Result<(), TryPushError<T>> {
        let Some(mut cached_begin) = self.producer.try_acquire() else {
            return Err(TryPushError::Busy(value));
        };

        let capacity = self.capacity();
        let end = self.end.load(Ordering::Relaxed);
        if self.wrap.distance(*cached_begin, end) >= capacity {
            *cached_begin = self.begin.load(Ordering::Acquire);
            if self.wrap.distance(*cached_begin, end) >= capacity {
                return Err(TryPushError::Full(value));
            }
        }

        // SAFETY: there is room, and only the quota holder writes at `end`.
        unsafe { self.slots.write(self.wrap.slot(end), value) };
        self.end.store(self.wrap.inc(end), Ordering::Release);
        Ok(())
    }

    /// Consumer side: remove from the front.
    pub fn try_pop_front(&self) -> Result<T, TryPopError> {
        let Some(mut cached_end) = self.consumer.try_acquire() else {
            return Err(TryPopError::Busy);
        };

        let begin = self.begin.load(Ordering::Relaxed);
        if *cached_end == begin {
            *cached_end = self.end.load(Ordering::Acquire);
            if *cached_end == begin {
                return Err(TryPopError::Empty);
            }
        }

        // SAFETY: the acquire load of `end` made the slot's contents visible.
        let value = unsafe { self.slots.take(self.wrap.slot(begin)) };
        self.begin.store(self.wrap.inc(begin), Ordering::Release);
        Ok(value)
    }

    /// Insert at the front, ahead of everything already queued.
    pub fn try_push_front(&self, value: T) -> Result<(), TryPushError<T>> {
        let Some(mut cached_end) = self.consumer.try_acquire() else {
            return Err(TryPushError::Busy(value));
        };
        let Some(mut cached_begin) = self.producer.try_acquire() else {
            return Err(TryPushError::Busy(value));
        };

        let begin = self.begin.load(Ordering::Acquire);
        let end = self.end.load(Ordering::Acquire);
        if self.wrap.distance(begin, end) >= self.capacity() {
            return Err(TryPushError::Full(value));
        }

        let begin = self.wrap.dec(begin);
        // SAFETY: not full, and both quotas keep either side off this slot.
        unsafe { self.slots.write(self.wrap.slot(begin), value) };
        self.begin.store(begin, Ordering::Release);
        // The producer's cached `begin` would otherwise claim room that is gone.
        *cached_begin = begin;
        *cached_end = end;
        Ok(())
    }

    /// Remove the most recently pushed element.
    pub fn try_pop_back(&self) -> Result<T, TryPopError> {
        let Some(mut cached_end) = self.consumer.try_acquire() else {
            return Err(TryPopError::Busy);
        };
        let Some(mut cached_begin) = self.producer.try_acquire() else {
            return Err(TryPopError::Busy);
        };

        let begin = self.begin.load(Ordering::Acquire);
        let end = self.end.load(Ordering::Acquire);
        if begin == end {
            return Err(TryPopError::Empty);
        }

        let end = self.wrap.dec(end);
        // SAFETY: non-empty, and both quotas keep either side off this slot.
        let value = unsafe { self.slots.take(self.wrap.slot(end)) };
        self.end.store(end, Ordering::Release);
        // The consumer's cached `end` would otherwise point past a vacated slot.
        *cached_end = end;
        *cached_begin = begin;
        Ok(value)
    }

    /// Push at the back, busy-spinning until there is room.
    pub fn push_back(&self, value: T) {
        if self.push_back_with(value, &mut Spin).is_err() {
            unreachable!("spin wait never gives up");
        }
    }

    /// Push at the back, calling `wait` between attempts. Hands the value
    /// back if `wait` gives up.
    pub fn push_back_with<W>(&self, value: T, wait: &mut W) -> Result<(), T>
    where
        W: WaitStrategy + ?Sized,
    {
        self.retry_push(value, wait, Self::try_push_back)
    }

    pub fn push_front(&self, value: T) {
        if self.push_front_with(value, &mut Spin).is_err() {
            unreachable!("spin wait never gives up");
        }
    }

    pub fn push_front_with<W>(&self, value: T, wait: &mut W) -> Result<(), T>
    where
        W: WaitStrategy + ?Sized,
    {
        self.retry_push(value, wait, Self::try_push_front)
    }

    /// Pop from the front, busy-spinning until an element arrives.
    pub fn pop_front(&self) -> T {
        match self.pop_front_with(&mut Spin) {
            Some(value) => value,
            None => unreachable!("spin wait never gives up"),
        }
    }

    /// Pop from the front, calling `wait` between attempts. `None` if `wait`
    /// gives up first.
    pub fn pop_front_with<W>(&self, wait: &mut W) -> Option<T>
    where
        W: WaitStrategy + ?Sized,
    {
        self.retry_pop(wait, Self::try_pop_front)
    }

    pub fn pop_back(&self) -> T {
        match self.pop_back_with(&mut Spin) {
            Some(value) => value,
            None => unreachable!("spin wait never gives up"),
        }
    }

    pub fn pop_back_with<W>(&self, wait: &mut W) -> Option<T>
    where
        W: WaitStrategy + ?Sized,
    {
        self.retry_pop(wait, Self::try_pop_back)
    }

    fn retry_push<W>(
        &self,
        mut value: T,
        wait: &mut W,
        attempt: fn(&Self, T) -> Result<(), TryPushError<T>>,
    ) -> Result<(), T>
    where
        W: WaitStrategy + ?Sized,
    {
        loop {
            match attempt(self, value) {
                Ok(()) => return Ok(()),
                Err(err) => value = err.into_inner(),
            }
            if !wait.wait() {
                return Err(value);
            }
        }
    }

    fn retry_pop<W>(&self, wait: &mut W, attempt: fn(&Self) -> Result<T, TryPopError>) -> Option<T>
    where
        W: WaitStrategy + ?Sized,
    {
        loop {
            if let Ok(value) = attempt(self) {
                return Some(value);
            }
            if !wait.wait() {
                return None;
            }
        }
    }
}

impl<T, A: Allocator> Drop for SpscRing<T, A> {
    fn drop(&mut self) {
        let mut begin = self.begin.load(Ordering::Relaxed);
        let end = self.end.load(Ordering::Relaxed);
        while begin != end {
            // SAFETY: `&mut self` means no side is mid-call; [begin, end) is live.
            unsafe { self.slots.drop_in_place(self.wrap.slot(begin)) };
            begin = self.wrap.inc(begin);
        }
    }
}

impl<T, A: Allocator> fmt::Debug for SpscRing<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscRing")
            .field("begin", &self.begin.load(Ordering::Relaxed))
            .field("end", &self.end.load(Ordering::Relaxed))
            .field("capacity", &self.capacity())
            .finish()
    }
}
