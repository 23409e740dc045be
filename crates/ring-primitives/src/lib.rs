//! Bounded ring buffers for in-process thread hand-off.
//!
//! # Primitives
//!
//! - [`BoundedRing`]: single-threaded fixed-capacity ring with push and pop at
//!   both ends
//! - [`SpscRing`]: shared-by-reference ring for one producer thread and one
//!   consumer thread, each side guarded by a [`Quota`] spinlock
//! - [`SpscDeque`]: leaner SPSC queue split into owned producer/consumer
//!   handles, with cached opposite-cursor snapshots and no spinlock
//!
//! All three use unbounded cursors reduced modulo the capacity through
//! [`Wrap`], which keeps the slot mapping consistent across counter overflow
//! for any capacity, not just powers of two.
//!
//! # Blocking
//!
//! Every `try_*` operation returns immediately. The blocking variants retry it
//! and consult a [`WaitStrategy`] between attempts; see [`wait`].
//!
//! # Loom Testing
//!
//! Enable the `loom` feature to model-check the SPSC structures and the quota
//! across thread interleavings.
//!
//! ```text
//! cargo test -p ring-primitives --features loom --release
//! ```

#![no_std]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod cursor;
pub mod deque;
pub mod error;
pub mod quota;
pub mod ring;
pub mod spsc;
mod storage;
pub mod sync;
pub mod wait;

pub use cursor::Wrap;
pub use deque::{DequeConsumer, DequeProducer, SpscDeque};
pub use error::{RingFull, StorageError, TryPopError, TryPushError};
pub use quota::{Quota, QuotaGuard};
pub use ring::BoundedRing;
pub use spsc::SpscRing;
#[cfg(feature = "std")]
pub use wait::{MonotonicClock, SleepFor, SleepUntil, Yield};
pub use wait::{Bounded, Deadline, Spin, TimeSource, WaitStrategy};
