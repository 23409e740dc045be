//! Single-threaded bounded ring with push and pop at both ends.

use core::fmt;
use core::iter::FusedIterator;

use allocator_api2::alloc::{Allocator, Global};

use crate::cursor::Wrap;
use crate::error::{RingFull, StorageError};
use crate::storage::Slots;

/// A fixed-capacity circular buffer.
///
/// `begin` and `end` are unbounded cursors reduced through [`Wrap`]; the live
/// elements are exactly the slots from `begin` (inclusive) to `end`
/// (exclusive). Storage is allocated once and never resized.
pub struct BoundedRing<T, A: Allocator = Global> {
    slots: Slots<T, A>,
    wrap: Wrap,
    begin: usize,
    end: usize,
}

// SAFETY: the ring owns its elements; sending it sends the elements.
unsafe impl<T: Send, A: Allocator + Send> Send for BoundedRing<T, A> {}
// SAFETY: shared access only hands out `&T`.
unsafe impl<T: Sync, A: Allocator + Sync> Sync for BoundedRing<T, A> {}

impl<T> BoundedRing<T> {
    /// Create a ring with room for `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or too large; aborts through
    /// `handle_alloc_error` if the allocation fails.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<T, A: Allocator> BoundedRing<T, A> {
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        match Self::try_with_capacity_in(capacity, alloc) {
            Ok(ring) => ring,
            Err(StorageError::AllocFailed { layout }) => alloc::alloc::handle_alloc_error(layout),
            Err(err) => panic!("{}", err),
        }
    }

    /// Fallible construction: reports a zero or oversized capacity and
    /// allocator failure instead of panicking.
    pub fn try_with_capacity_in(capacity: usize, alloc: A) -> Result<Self, StorageError> {
        let slots = Slots::try_new_in(capacity, alloc)?;
        tracing::trace!(capacity, "bounded ring allocated");
        Ok(Self {
            slots,
            wrap: Wrap::new(capacity),
            begin: 0,
            end: 0,
        })
    }

    /// Move both cursors of an empty ring to `cursor` (reduced into the
    /// cursor period). Useful to exercise the wraparound boundary.
    ///
    /// # Panics
    ///
    /// Panics if the ring is not empty.
    #[doc(hidden)]
    pub fn with_cursor_origin(mut self, cursor: usize) -> Self {
        assert!(self.is_empty(), "cursor origin can only move on an empty ring");
        let cursor = self.wrap.normalize(cursor);
        self.begin = cursor;
        self.end = cursor;
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.wrap.distance(self.begin, self.end)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Cursor period of this ring (see [`Wrap::period`]).
    #[inline]
    pub fn cursor_period(&self) -> usize {
        self.wrap.period()
    }

    /// Append at the back. A full ring hands the value back untouched.
    pub fn try_push_back(&mut self, value: T) -> Result<(), RingFull<T>> {
        if self.is_full() {
            return Err(RingFull(value));
        }
        // SAFETY: not full, so the slot at `end` is vacant.
        unsafe { self.slots.write(self.wrap.slot(self.end), value) };
        self.end = self.wrap.inc(self.end);
        Ok(())
    }

    /// Prepend at the front. A full ring hands the value back untouched.
    pub fn try_push_front(&mut self, value: T) -> Result<(), RingFull<T>> {
        if self.is_full() {
            return Err(RingFull(value));
        }
        let begin = self.wrap.dec(self.begin);
        // SAFETY: not full, so the slot just before `begin` is vacant.
        unsafe { self.slots.write(self.wrap.slot(begin), value) };
        self.begin = begin;
        Ok(())
    }

    /// Remove the last element; `None` (and no change) on an empty ring.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        self.end = self.wrap.dec(self.end);
        // SAFETY: the slot before the old `end` held the last live element.
        Some(unsafe { self.slots.take(self.wrap.slot(self.end)) })
    }

    /// Remove the first element; `None` (and no change) on an empty ring.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: `begin` is live on a non-empty ring.
        let value = unsafe { self.slots.take(self.wrap.slot(self.begin)) };
        self.begin = self.wrap.inc(self.begin);
        Some(value)
    }

    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: `begin` is live on a non-empty ring.
        Some(unsafe { self.slots.get(self.wrap.slot(self.begin)) })
    }

    pub fn back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: the slot before `end` is live on a non-empty ring.
        Some(unsafe { self.slots.get(self.wrap.slot(self.wrap.dec(self.end))) })
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: live slot, and `&mut self` rules out aliasing.
        Some(unsafe { self.slots.get_mut(self.wrap.slot(self.begin)) })
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: live slot, and `&mut self` rules out aliasing.
        Some(unsafe { self.slots.get_mut(self.wrap.slot(self.wrap.dec(self.end))) })
    }

    /// First element without the emptiness check.
    ///
    /// # Safety
    ///
    /// The ring must not be empty. Debug builds assert this.
    #[inline]
    pub unsafe fn front_unchecked(&self) -> &T {
        debug_assert!(!self.is_empty(), "front_unchecked on an empty ring");
        unsafe { self.slots.get(self.wrap.slot(self.begin)) }
    }

    /// Last element without the emptiness check.
    ///
    /// # Safety
    ///
    /// The ring must not be empty. Debug builds assert this.
    #[inline]
    pub unsafe fn back_unchecked(&self) -> &T {
        debug_assert!(!self.is_empty(), "back_unchecked on an empty ring");
        unsafe { self.slots.get(self.wrap.slot(self.wrap.dec(self.end))) }
    }

    /// Element `index` positions from the front.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len() {
            return None;
        }
        let slot = (self.wrap.slot(self.begin) + index) % self.capacity();
        // SAFETY: index < len, so the slot is live.
        Some(unsafe { self.slots.get(slot) })
    }

    /// Drop every live element, front to back.
    pub fn clear(&mut self) {
        while !self.is_empty() {
            // SAFETY: `begin` is live; advance before anything can observe it.
            let slot = self.wrap.slot(self.begin);
            self.begin = self.wrap.inc(self.begin);
            unsafe { self.slots.drop_in_place(slot) };
        }
    }

    pub fn iter(&self) -> Iter<'_, T, A> {
        Iter {
            ring: self,
            cursor: self.begin,
            remaining: self.len(),
        }
    }
}

impl<T, A: Allocator> Drop for BoundedRing<T, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for BoundedRing<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Front-to-back iterator over a [`BoundedRing`].
pub struct Iter<'a, T, A: Allocator = Global> {
    ring: &'a BoundedRing<T, A>,
    cursor: usize,
    remaining: usize,
}

impl<'a, T, A: Allocator> Iterator for Iter<'a, T, A> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.ring.wrap.slot(self.cursor);
        self.cursor = self.ring.wrap.inc(self.cursor);
        self.remaining -= 1;
        // SAFETY: the iterator only walks the live range of a borrowed ring.
        Some(unsafe { self.ring.slots.get(slot) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, A: Allocator> ExactSizeIterator for Iter<'_, T, A> {}
impl<T, A: Allocator> FusedIterator for Iter<'_, T, A> {}

impl<'a, T, A: Allocator> IntoIterator for &'a BoundedRing<T, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "front_unchecked on an empty ring")]
    fn front_unchecked_on_empty_panics_in_debug() {
        let ring = BoundedRing::<u8>::with_capacity(2);
        let _ = unsafe { ring.front_unchecked() };
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "back_unchecked on an empty ring")]
    fn back_unchecked_after_draining_panics_in_debug() {
        let mut ring = BoundedRing::with_capacity(2);
        ring.try_push_back(1u8).unwrap();
        assert_eq!(ring.pop_front(), Some(1));
        let _ = unsafe { ring.back_unchecked() };
    }

    #[test]
    fn capacity_four_scenario() {
        let mut ring = BoundedRing::with_capacity(4);
        for c in ['A', 'B', 'C', 'D'] {
            assert!(ring.try_push_back(c).is_ok());
        }
        assert_eq!(ring.try_push_back('E'), Err(RingFull('E')));
        assert_eq!(ring.pop_front(), Some('A'));
        assert!(ring.try_push_back('E').is_ok());

        let drained: Vec<_> = core::iter::from_fn(|| ring.pop_front()).collect();
        assert_eq!(drained, ['B', 'C', 'D', 'E']);
        assert_eq!(ring.pop_front(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn push_front_and_pop_back() {
        let mut ring = BoundedRing::with_capacity(3);
        ring.try_push_front(2).unwrap();
        ring.try_push_front(1).unwrap();
        ring.try_push_back(3).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.try_push_front(0).unwrap_err().into_inner(), 0);
        assert_eq!(ring.front(), Some(&1));
        assert_eq!(ring.back(), Some(&3));
        assert_eq!(ring.pop_back(), Some(3));
        assert_eq!(ring.pop_back(), Some(2));
        assert_eq!(ring.pop_back(), Some(1));
        assert_eq!(ring.pop_back(), None);
        assert_eq!(ring.front(), None);
    }

    #[test]
    fn iter_and_get_follow_logical_order() {
        let ring = BoundedRing::with_capacity(4);
        let origin = ring.cursor_period() - 2;
        let mut ring = ring.with_cursor_origin(origin);
        for i in 0..4 {
            ring.try_push_back(i).unwrap();
        }
        ring.pop_front();
        ring.try_push_back(4).unwrap();
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), [1, 2, 3, 4]);
        assert_eq!(ring.get(0), Some(&1));
        assert_eq!(ring.get(3), Some(&4));
        assert_eq!(ring.get(4), None);
        assert_eq!(alloc::format!("{:?}", ring), "[1, 2, 3, 4]");
    }

    #[test]
    fn front_mut_modifies_in_place() {
        let mut ring = BoundedRing::with_capacity(2);
        ring.try_push_back(10).unwrap();
        ring.try_push_back(20).unwrap();
        *ring.front_mut().unwrap() += 1;
        *ring.back_mut().unwrap() += 2;
        assert_eq!(unsafe { *ring.front_unchecked() }, 11);
        assert_eq!(unsafe { *ring.back_unchecked() }, 22);
    }

    #[test]
    fn drop_destroys_only_live_elements() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut ring = BoundedRing::with_capacity(4);
            for _ in 0..4 {
                assert!(ring.try_push_back(DropCounter(drops.clone())).is_ok());
            }
            drop(ring.pop_front());
            assert_eq!(drops.get(), 1);
            let accepted = ring.try_push_back(DropCounter(drops.clone()));
            assert!(accepted.is_ok());
            let rejected = ring.try_push_back(DropCounter(drops.clone()));
            assert!(rejected.is_err());
            drop(rejected);
            assert_eq!(drops.get(), 2);
        }
        assert_eq!(drops.get(), 6);
    }

    #[test]
    fn zero_sized_elements() {
        let mut ring = BoundedRing::with_capacity(3);
        for _ in 0..3 {
            ring.try_push_back(()).unwrap();
        }
        assert!(ring.try_push_back(()).is_err());
        assert_eq!(ring.len(), 3);
        ring.clear();
        assert!(ring.is_empty());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = BoundedRing::<u8>::try_with_capacity_in(0, Global).unwrap_err();
        assert_eq!(err, StorageError::ZeroCapacity);
    }

    #[derive(Debug, Clone)]
    enum Op {
        PushBack(u16),
        PushFront(u16),
        PopBack,
        PopFront,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u16>().prop_map(Op::PushBack),
            any::<u16>().prop_map(Op::PushFront),
            Just(Op::PopBack),
            Just(Op::PopFront),
        ]
    }

    proptest! {
        #[test]
        fn matches_vecdeque_near_cursor_boundary(
            cap in 1usize..9,
            back in 0usize..16,
            ops in prop::collection::vec(op(), 1..300),
        ) {
            let ring = BoundedRing::with_capacity(cap);
            let origin = ring.cursor_period() - back.min(ring.cursor_period() - 1);
            let mut ring = ring.with_cursor_origin(origin);
            let mut model = VecDeque::with_capacity(cap);

            for op in ops {
                match op {
                    Op::PushBack(v) => {
                        let pushed = ring.try_push_back(v).is_ok();
                        prop_assert_eq!(pushed, model.len() < cap);
                        if pushed {
                            model.push_back(v);
                        }
                    }
                    Op::PushFront(v) => {
                        let pushed = ring.try_push_front(v).is_ok();
                        prop_assert_eq!(pushed, model.len() < cap);
                        if pushed {
                            model.push_front(v);
                        }
                    }
                    Op::PopBack => prop_assert_eq!(ring.pop_back(), model.pop_back()),
                    Op::PopFront => prop_assert_eq!(ring.pop_front(), model.pop_front()),
                }
                prop_assert!(ring.len() <= ring.capacity());
                prop_assert_eq!(ring.len(), model.len());
                prop_assert_eq!(ring.is_full(), model.len() == cap);
                prop_assert_eq!(ring.front(), model.front());
                prop_assert_eq!(ring.back(), model.back());
            }
            prop_assert!(ring.iter().eq(model.iter()));
        }

        #[test]
        fn fifo_through_boundary(cap in 1usize..16, values in prop::collection::vec(any::<u32>(), 0..64)) {
            let ring = BoundedRing::with_capacity(cap);
            let origin = ring.cursor_period() - 3usize.min(ring.cursor_period());
            let mut ring = ring.with_cursor_origin(origin);
            let mut out = Vec::new();
            for chunk in values.chunks(cap) {
                for &v in chunk {
                    prop_assert!(ring.try_push_back(v).is_ok());
                }
                while let Some(v) = ring.pop_front() {
                    out.push(v);
                }
            }
            prop_assert_eq!(out, values);
        }
    }
}
