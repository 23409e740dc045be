//! Cursor arithmetic shared by every ring in this crate.
//!
//! Rings track their ends with counters that grow without bound and are
//! reduced modulo the capacity to find a physical slot. A plain `usize`
//! wrapping at `usize::MAX` only keeps `counter % capacity` consistent when
//! the capacity divides `2^BITS`, so for arbitrary capacities the counters
//! instead wrap at `period`, the largest multiple of the capacity that fits in
//! a `usize`:
//!
//! ```text
//!   0 ......................................... period-1 | 0 ...
//!   |<- cap ->|<- cap ->| ... |<- cap ->|<- cap ->|        (congruence kept)
//! ```
//!
//! Distances between two cursors are taken modulo `period`, which is always at
//! least twice the capacity, so `end - begin` is unambiguous for any valid
//! ring state.

/// Modulo-congruent wraparound policy for a fixed capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wrap {
    capacity: usize,
    period: usize,
}

impl Wrap {
    /// Largest capacity a ring may have; keeps `period >= 2 * capacity`.
    pub const MAX_CAPACITY: usize = usize::MAX / 2;

    /// Build the policy for `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or above [`Wrap::MAX_CAPACITY`].
    pub const fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(
            capacity <= Self::MAX_CAPACITY,
            "capacity must be <= usize::MAX / 2"
        );
        Self {
            capacity,
            period: (usize::MAX / capacity) * capacity,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Value at which cursors wrap back to zero.
    #[inline]
    pub const fn period(&self) -> usize {
        self.period
    }

    /// Physical slot for a cursor.
    #[inline]
    pub const fn slot(&self, cursor: usize) -> usize {
        cursor % self.capacity
    }

    #[inline]
    pub const fn inc(&self, cursor: usize) -> usize {
        debug_assert!(cursor < self.period);
        if cursor + 1 == self.period {
            0
        } else {
            cursor + 1
        }
    }

    #[inline]
    pub const fn dec(&self, cursor: usize) -> usize {
        debug_assert!(cursor < self.period);
        if cursor == 0 {
            self.period - 1
        } else {
            cursor - 1
        }
    }

    /// Number of steps from `begin` forward to `end`.
    #[inline]
    pub const fn distance(&self, begin: usize, end: usize) -> usize {
        if end >= begin {
            end - begin
        } else {
            self.period - begin + end
        }
    }

    /// Reduce an arbitrary counter value into `[0, period)`.
    #[inline]
    pub const fn normalize(&self, cursor: usize) -> usize {
        cursor % self.period
    }
}
