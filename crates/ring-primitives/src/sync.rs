//! Atomics and threads, switched to loom's model-checked versions under the
//! `loom` feature.

#[cfg(not(feature = "loom"))]
pub use core::hint::spin_loop;
#[cfg(feature = "loom")]
pub use loom::hint::spin_loop;

#[cfg(not(feature = "loom"))]
pub use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(not(feature = "loom"))]
pub use alloc::sync::Arc;
#[cfg(feature = "loom")]
pub use loom::sync::Arc;

#[cfg(feature = "loom")]
pub use loom::thread;
#[cfg(all(not(feature = "loom"), feature = "std"))]
pub use std::thread;

/// Keeps a value on its own cache line so the producer's and consumer's
/// cursors do not false-share.
#[repr(C, align(64))]
pub(crate) struct CacheAligned<T>(pub(crate) T);

impl<T> core::ops::Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}
