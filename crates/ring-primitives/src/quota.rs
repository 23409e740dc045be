//! Per-side spinlock ("quota") for the SPSC ring.
//!
//! A quota is held for the duration of one push or pop attempt. It owns the
//! small amount of state only that side touches (the cached snapshot of the
//! opposite cursor), so holding the guard is what grants access to it.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::sync::{AtomicBool, Ordering, spin_loop};

pub struct Quota<T> {
    held: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialised by `held`.
unsafe impl<T: Send> Send for Quota<T> {}
unsafe impl<T: Send> Sync for Quota<T> {}

impl<T> Quota<T> {
    pub fn new(data: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Take the quota if nobody holds it.
    #[inline]
    pub fn try_acquire(&self) -> Option<QuotaGuard<'_, T>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(QuotaGuard { quota: self })
        } else {
            None
        }
    }

    /// Spin until the quota is free, backing off exponentially.
    pub fn acquire(&self) -> QuotaGuard<'_, T> {
        let mut backoff = 1u32;

        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            // Wait for a release before retrying the CAS.
            while self.held.load(Ordering::Relaxed) {
                for _ in 0..backoff {
                    spin_loop();
                }
                backoff = (backoff * 2).min(64);
            }
        }
    }

    /// Whether some caller currently holds the quota.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// Direct access when exclusivity is already proven by `&mut self`.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Proof of holding a [`Quota`]; releases it on drop.
#[must_use = "the quota is released as soon as the guard is dropped"]
pub struct QuotaGuard<'a, T> {
    quota: &'a Quota<T>,
}

impl<T> Deref for QuotaGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: we hold the quota.
        unsafe { &*self.quota.data.get() }
    }
}

impl<T> DerefMut for QuotaGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: we hold the quota.
        unsafe { &mut *self.quota.data.get() }
    }
}

impl<T> Drop for QuotaGuard<'_, T> {
    fn drop(&mut self) {
        self.quota.release();
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::sync::Arc;
    use std::thread;

    #[test]
    fn try_acquire_is_exclusive() {
        let quota = Quota::new(0u32);
        let guard = quota.try_acquire().expect("free quota");
        assert!(quota.is_held());
        assert!(quota.try_acquire().is_none());
        drop(guard);
        assert!(!quota.is_held());
        assert!(quota.try_acquire().is_some());
    }

    #[test]
    fn released_on_early_return() {
        fn bump(quota: &Quota<u32>, stop: bool) -> Option<u32> {
            let mut guard = quota.try_acquire()?;
            if stop {
                return None;
            }
            *guard += 1;
            Some(*guard)
        }

        let quota = Quota::new(0);
        assert_eq!(bump(&quota, true), None);
        assert!(!quota.is_held());
        assert_eq!(bump(&quota, false), Some(1));
    }

    #[test]
    fn acquire_serialises_threads() {
        let quota = Arc::new(Quota::new(0u64));
        let handles: alloc::vec::Vec<_> = (0..4)
            .map(|_| {
                let quota = quota.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *quota.acquire() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*quota.acquire(), 40_000);
    }
}
