use core::alloc::Layout;
use core::fmt;

/// Returned by a push on a full ring, handing the value back.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RingFull<T>(pub T);

impl<T> RingFull<T> {
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for RingFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RingFull(..)")
    }
}

impl<T> fmt::Display for RingFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ring is full")
    }
}

impl<T> core::error::Error for RingFull<T> {}

/// Why a non-blocking push on an [`SpscRing`](crate::SpscRing) did not happen.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TryPushError<T> {
    /// No vacant slot at this moment.
    Full(T),
    /// Another caller holds this side's quota.
    Busy(T),
}

impl<T> TryPushError<T> {
    /// Recover the value that was not pushed.
    #[inline]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Busy(value) => value,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl<T> From<RingFull<T>> for TryPushError<T> {
    fn from(full: RingFull<T>) -> Self {
        Self::Full(full.0)
    }
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Busy(_) => f.write_str("Busy(..)"),
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "ring is full"),
            Self::Busy(_) => write!(f, "producer quota is held by another caller"),
        }
    }
}

impl<T> core::error::Error for TryPushError<T> {}

/// Why a non-blocking pop on an [`SpscRing`](crate::SpscRing) returned nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPopError {
    /// No live element at this moment.
    Empty,
    /// Another caller holds this side's quota.
    Busy,
}

impl fmt::Display for TryPopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "ring is empty"),
            Self::Busy => write!(f, "consumer quota is held by another caller"),
        }
    }
}

impl core::error::Error for TryPopError {}

/// Failure to set up ring storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Rings need at least one slot.
    ZeroCapacity,
    /// Capacity does not fit the cursor space or the address space.
    CapacityOverflow { capacity: usize },
    /// The allocator refused the request.
    AllocFailed { layout: Layout },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "capacity must be > 0"),
            Self::CapacityOverflow { capacity } => {
                write!(f, "capacity {} is too large", capacity)
            }
            Self::AllocFailed { layout } => write!(
                f,
                "allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            ),
        }
    }
}

impl core::error::Error for StorageError {}
