//! `allocator-api2` adapter over a shared shelf.

use core::alloc::Layout;
use core::ptr::{self, NonNull};
use std::sync::Arc;

use allocator_api2::alloc::{AllocError, Allocator};
use parking_lot::Mutex;

use crate::shelf::{Shelf, ShelfStats};

/// Cloneable handle that lets `allocator_api2` collections live on a shelf.
///
/// Alignment is limited to the shelf's word size and a single allocation to
/// one page. Anything beyond that fails with [`AllocError`].
#[derive(Clone)]
pub struct ShelfAllocator {
    shelf: Arc<Mutex<Shelf>>,
}

impl ShelfAllocator {
    pub fn new(shelf: Shelf) -> Self {
        Self {
            shelf: Arc::new(Mutex::new(shelf)),
        }
    }

    /// Run `f` with the shelf locked.
    pub fn with_shelf<R>(&self, f: impl FnOnce(&mut Shelf) -> R) -> R {
        f(&mut self.shelf.lock())
    }

    pub fn stats(&self) -> ShelfStats {
        self.shelf.lock().stats()
    }
}

unsafe impl Allocator for ShelfAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let mut shelf = self.shelf.lock();
        let word = shelf.config().word_size;
        if layout.align() > word {
            return Err(AllocError);
        }
        if layout.size() == 0 {
            let dangling = NonNull::new(ptr::without_provenance_mut::<u8>(layout.align()))
                .ok_or(AllocError)?;
            return Ok(NonNull::slice_from_raw_parts(dangling, 0));
        }
        let ptr = shelf.allocate(layout.size()).map_err(|_| AllocError)?;
        let len = layout.size().div_ceil(word) * word;
        Ok(NonNull::slice_from_raw_parts(ptr, len))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        // Failures are already logged by the shelf.
        let _ = self.shelf.lock().deallocate(ptr, layout.size());
    }
}

impl core::fmt::Debug for ShelfAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShelfAllocator").finish_non_exhaustive()
    }
}
