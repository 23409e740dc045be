//! Lean SPSC deque: one producer handle, one consumer handle, no quotas.
//!
//! Exclusivity of each side is enforced by ownership instead of a spinlock:
//! [`SpscDeque::split`] hands out exactly one [`DequeProducer`] and one
//! [`DequeConsumer`], and both take `&mut self`. Each handle keeps its own
//! cursor locally (it is the only writer) plus a cached snapshot of the
//! opposite cursor that is refreshed with an acquire load only when the
//! snapshot says there is no room / nothing to read.

use core::fmt;

use allocator_api2::alloc::{Allocator, Global};

use crate::cursor::Wrap;
use crate::error::{RingFull, StorageError};
use crate::storage::Slots;
use crate::sync::{Arc, AtomicUsize, CacheAligned, Ordering};
use crate::wait::{Spin, WaitStrategy};

struct Shared<T, A: Allocator> {
    /// Producer cursor.
    back: CacheAligned<AtomicUsize>,
    /// Consumer cursor.
    front: CacheAligned<AtomicUsize>,
    wrap: Wrap,
    slots: Slots<T, A>,
}

// SAFETY: slots are handed between the two handles through the cursors.
unsafe impl<T: Send, A: Allocator + Send> Send for Shared<T, A> {}
unsafe impl<T: Send, A: Allocator + Sync> Sync for Shared<T, A> {}

impl<T, A: Allocator> Drop for Shared<T, A> {
    fn drop(&mut self) {
        let mut front = self.front.load(Ordering::Relaxed);
        let back = self.back.load(Ordering::Relaxed);
        while front != back {
            // SAFETY: both handles are gone; [front, back) is live.
            unsafe { self.slots.drop_in_place(self.wrap.slot(front)) };
            front = self.wrap.inc(front);
        }
    }
}

/// An SPSC deque before it is split into its two handles.
pub struct SpscDeque<T, A: Allocator = Global> {
    shared: Shared<T, A>,
}

impl<T> SpscDeque<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero or too large; aborts through
    /// `handle_alloc_error` if the allocation fails.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<T, A: Allocator> SpscDeque<T, A> {
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        match Self::try_with_capacity_in(capacity, alloc) {
            Ok(deque) => deque,
            Err(StorageError::AllocFailed { layout }) => alloc::alloc::handle_alloc_error(layout),
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_with_capacity_in(capacity: usize, alloc: A) -> Result<Self, StorageError> {
        let slots = Slots::try_new_in(capacity, alloc)?;
        tracing::trace!(capacity, "spsc deque allocated");
        Ok(Self {
            shared: Shared {
                back: CacheAligned(AtomicUsize::new(0)),
                front: CacheAligned(AtomicUsize::new(0)),
                wrap: Wrap::new(capacity),
                slots,
            },
        })
    }

    /// Start both cursors at `cursor` (reduced into the cursor period).
    #[doc(hidden)]
    pub fn with_cursor_origin(mut self, cursor: usize) -> Self {
        let back = self.shared.back.load(Ordering::Relaxed);
        let front = self.shared.front.load(Ordering::Relaxed);
        assert!(back == front, "cursor origin can only move on an empty deque");
        let cursor = self.shared.wrap.normalize(cursor);
        self.shared.back = CacheAligned(AtomicUsize::new(cursor));
        self.shared.front = CacheAligned(AtomicUsize::new(cursor));
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.capacity()
    }

    #[inline]
    pub fn cursor_period(&self) -> usize {
        self.shared.wrap.period()
    }

    /// Hand out the producer and consumer halves.
    pub fn split(self) -> (DequeProducer<T, A>, DequeConsumer<T, A>) {
        let back = self.shared.back.load(Ordering::Relaxed);
        let front = self.shared.front.load(Ordering::Relaxed);
        let shared = Arc::new(self.shared);
        (
            DequeProducer {
                shared: shared.clone(),
                back,
                saved_front: front,
            },
            DequeConsumer {
                shared,
                front,
                saved_back: back,
            },
        )
    }
}

/// The producing half of an [`SpscDeque`].
pub struct DequeProducer<T, A: Allocator = Global> {
    shared: Arc<Shared<T, A>>,
    /// Local copy of `shared.back`; this handle is its only writer.
    back: usize,
    /// Last observed `shared.front`; may lag behind.
    saved_front: usize,
}

impl<T, A: Allocator> DequeProducer<T, A> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.capacity()
    }

    /// Whether the deque is full, refreshing the saved front if it looks so.
    pub fn is_full(&mut self) -> bool {
        let wrap = &self.shared.wrap;
        let capacity = self.shared.slots.capacity();
        if wrap.distance(self.saved_front, self.back) < capacity {
            return false;
        }
        self.saved_front = self.shared.front.load(Ordering::Acquire);
        wrap.distance(self.saved_front, self.back) >= capacity
    }

    /// Number of queued elements as seen from the producer.
    pub fn len(&self) -> usize {
        let front = self.shared.front.load(Ordering::Acquire);
        self.shared.wrap.distance(front, self.back)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn try_push_back(&mut self, value: T) -> Result<(), RingFull<T>> {
        if self.is_full() {
            return Err(RingFull(value));
        }
        let shared = &*self.shared;
        // SAFETY: not full, and this handle is the only writer of vacant slots.
        unsafe { shared.slots.write(shared.wrap.slot(self.back), value) };
        self.back = shared.wrap.inc(self.back);
        shared.back.store(self.back, Ordering::Release);
        Ok(())
    }

    /// Push, busy-spinning until there is room.
    pub fn push_back(&mut self, value: T) {
        if self.push_back_with(value, &mut Spin).is_err() {
            unreachable!("spin wait never gives up");
        }
    }

    /// Push, calling `wait` between attempts; hands the value back if `wait`
    /// gives up.
    pub fn push_back_with<W>(&mut self, mut value: T, wait: &mut W) -> Result<(), T>
    where
        W: WaitStrategy + ?Sized,
    {
        loop {
            match self.try_push_back(value) {
                Ok(()) => return Ok(()),
                Err(RingFull(rejected)) => value = rejected,
            }
            if !wait.wait() {
                return Err(value);
            }
        }
    }
}

/// The consuming half of an [`SpscDeque`].
pub struct DequeConsumer<T, A: Allocator = Global> {
    shared: Arc<Shared<T, A>>,
    /// Local copy of `shared.front`; this handle is its only writer.
    front: usize,
    /// Last observed `shared.back`; may lag behind.
    saved_back: usize,
}

impl<T, A: Allocator> DequeConsumer<T, A> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.capacity()
    }

    /// Whether the deque is empty, refreshing the saved back if it looks so.
    pub fn is_empty(&mut self) -> bool {
        if self.saved_back != self.front {
            return false;
        }
        self.saved_back = self.shared.back.load(Ordering::Acquire);
        self.saved_back == self.front
    }

    /// Number of queued elements as seen from the consumer.
    pub fn len(&self) -> usize {
        let back = self.shared.back.load(Ordering::Acquire);
        self.shared.wrap.distance(self.front, back)
    }

    pub fn try_pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let shared = &*self.shared;
        // SAFETY: the acquire load of `back` published this slot's value.
        let value = unsafe { shared.slots.take(shared.wrap.slot(self.front)) };
        self.front = shared.wrap.inc(self.front);
        shared.front.store(self.front, Ordering::Release);
        Some(value)
    }

    /// Pop, busy-spinning until an element arrives.
    pub fn pop_front(&mut self) -> T {
        match self.pop_front_with(&mut Spin) {
            Some(value) => value,
            None => unreachable!("spin wait never gives up"),
        }
    }

    pub fn pop_front_with<W>(&mut self, wait: &mut W) -> Option<T>
    where
        W: WaitStrategy + ?Sized,
    {
        loop {
            if let Some(value) = self.try_pop_front() {
                return Some(value);
            }
            if !wait.wait() {
                return None;
            }
        }
    }
}

impl<T, A: Allocator> fmt::Debug for DequeProducer<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DequeProducer")
            .field("back", &self.back)
            .field("saved_front", &self.saved_front)
            .finish()
    }
}

impl<T, A: Allocator> fmt::Debug for DequeConsumer<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DequeConsumer")
            .field("front", &self.front)
            .field("saved_back", &self.saved_back)
            .finish()
    }
}
