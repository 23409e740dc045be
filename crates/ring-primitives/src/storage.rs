//! Uninitialised slot storage shared by the rings.
//!
//! `Slots` owns a single allocation of `capacity` values of `T` and never
//! tracks which of them are live: the ring that owns it is responsible for
//! writing into a slot before reading it and for dropping live values before
//! the storage goes away.

use core::alloc::Layout;
use core::mem::size_of;
use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Global};

use crate::error::StorageError;

pub(crate) struct Slots<T, A: Allocator = Global> {
    ptr: NonNull<T>,
    capacity: usize,
    alloc: A,
}

impl<T, A: Allocator> Slots<T, A> {
    pub(crate) fn try_new_in(capacity: usize, alloc: A) -> Result<Self, StorageError> {
        if capacity == 0 {
            return Err(StorageError::ZeroCapacity);
        }
        if capacity > crate::cursor::Wrap::MAX_CAPACITY {
            return Err(StorageError::CapacityOverflow { capacity });
        }
        let layout =
            Layout::array::<T>(capacity).map_err(|_| StorageError::CapacityOverflow { capacity })?;

        let ptr = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            alloc
                .allocate(layout)
                .map_err(|_| StorageError::AllocFailed { layout })?
                .cast::<T>()
        };

        Ok(Self {
            ptr,
            capacity,
            alloc,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn slot_ptr(&self, slot: usize) -> *mut T {
        debug_assert!(slot < self.capacity);
        // SAFETY: slot < capacity, so the offset stays inside the allocation.
        unsafe { self.ptr.as_ptr().add(slot) }
    }

    /// Move `value` into a vacant slot.
    ///
    /// # Safety
    ///
    /// The slot must be vacant; a live value there would be leaked.
    #[inline]
    pub(crate) unsafe fn write(&self, slot: usize, value: T) {
        unsafe { self.slot_ptr(slot).write(value) }
    }

    /// Move the value out of an occupied slot, leaving it vacant.
    ///
    /// # Safety
    ///
    /// The slot must be occupied and must not be read again until rewritten.
    #[inline]
    pub(crate) unsafe fn take(&self, slot: usize) -> T {
        unsafe { self.slot_ptr(slot).read() }
    }

    /// # Safety
    ///
    /// The slot must be occupied.
    #[inline]
    pub(crate) unsafe fn get(&self, slot: usize) -> &T {
        unsafe { &*self.slot_ptr(slot) }
    }

    /// # Safety
    ///
    /// The slot must be occupied and not aliased.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get_mut(&self, slot: usize) -> &mut T {
        unsafe { &mut *self.slot_ptr(slot) }
    }

    /// Drop the value in an occupied slot in place.
    ///
    /// # Safety
    ///
    /// The slot must be occupied; it is vacant afterwards.
    #[inline]
    pub(crate) unsafe fn drop_in_place(&self, slot: usize) {
        unsafe { core::ptr::drop_in_place(self.slot_ptr(slot)) }
    }
}

impl<T, A: Allocator> Drop for Slots<T, A> {
    fn drop(&mut self) {
        if size_of::<T>() == 0 {
            return;
        }
        // Layout was validated in try_new_in.
        if let Ok(layout) = Layout::array::<T>(self.capacity) {
            // SAFETY: ptr came from self.alloc with exactly this layout.
            unsafe { self.alloc.deallocate(self.ptr.cast(), layout) };
        }
    }
}
