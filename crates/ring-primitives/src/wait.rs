//! What a blocking push or pop does between two failed attempts.
//!
//! Blocking operations retry the matching `try_*` call and invoke
//! [`WaitStrategy::wait`] after every miss. Returning `false` from `wait`
//! abandons the operation, which is how deadlines, retry budgets and external
//! cancellation flags are expressed.
//!
//! | Strategy | Latency | CPU while waiting |
//! |---|---|---|
//! | [`Spin`] | lowest | one full core |
//! | [`Yield`] | low | scheduler-friendly |
//! | [`SleepFor`] / [`SleepUntil`] | bounded by the sleep | idle |

use core::time::Duration;

use crate::sync::spin_loop;

pub trait WaitStrategy {
    /// Called after an attempt failed. Return `false` to give up.
    fn wait(&mut self) -> bool;
}

/// Custom predicates: the closure runs between attempts and decides whether
/// to keep going.
impl<F: FnMut() -> bool> WaitStrategy for F {
    #[inline]
    fn wait(&mut self) -> bool {
        self()
    }
}

/// Busy-spin forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spin;

impl WaitStrategy for Spin {
    #[inline]
    fn wait(&mut self) -> bool {
        spin_loop();
        true
    }
}

/// Give the rest of the time slice back to the scheduler.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Yield;

#[cfg(feature = "std")]
impl WaitStrategy for Yield {
    #[inline]
    fn wait(&mut self) -> bool {
        crate::sync::thread::yield_now();
        true
    }
}

/// Sleep a fixed duration between attempts.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct SleepFor(pub Duration);

#[cfg(feature = "std")]
impl WaitStrategy for SleepFor {
    fn wait(&mut self) -> bool {
        std::thread::sleep(self.0);
        true
    }
}

/// Sleep until `wake_at` on the first miss, then yield on every later one.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct SleepUntil {
    wake_at: std::time::Instant,
}

#[cfg(feature = "std")]
impl SleepUntil {
    pub fn new(wake_at: std::time::Instant) -> Self {
        Self { wake_at }
    }
}

#[cfg(feature = "std")]
impl WaitStrategy for SleepUntil {
    fn wait(&mut self) -> bool {
        let now = std::time::Instant::now();
        if now < self.wake_at {
            std::thread::sleep(self.wake_at - now);
        } else {
            crate::sync::thread::yield_now();
        }
        true
    }
}

/// Allow at most `remaining` waits, delegating each one to `inner`.
#[derive(Debug, Clone, Copy)]
pub struct Bounded<W = Spin> {
    remaining: usize,
    inner: W,
}

impl Bounded<Spin> {
    pub fn spins(attempts: usize) -> Self {
        Self::new(attempts, Spin)
    }
}

impl<W: WaitStrategy> Bounded<W> {
    pub fn new(attempts: usize, inner: W) -> Self {
        Self {
            remaining: attempts,
            inner,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<W: WaitStrategy> WaitStrategy for Bounded<W> {
    fn wait(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.inner.wait()
    }
}

/// Monotonic clock used by deadline-based waits.
///
/// `now` must never go backwards, even if the wall clock is adjusted.
pub trait TimeSource {
    type Instant: Copy + Ord;

    fn now(&self) -> Self::Instant;

    /// Time elapsed from `earlier` to `later`; zero if `later` is not after it.
    fn duration_between(&self, earlier: Self::Instant, later: Self::Instant) -> Duration;
}

/// [`TimeSource`] backed by `std::time::Instant`.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

#[cfg(feature = "std")]
impl TimeSource for MonotonicClock {
    type Instant = std::time::Instant;

    #[inline]
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    #[inline]
    fn duration_between(&self, earlier: std::time::Instant, later: std::time::Instant) -> Duration {
        later.saturating_duration_since(earlier)
    }
}

/// Keep waiting with `inner` until `timeout` has elapsed on `clock`.
pub struct Deadline<C: TimeSource, W = Spin> {
    clock: C,
    start: C::Instant,
    timeout: Duration,
    inner: W,
}

#[cfg(feature = "std")]
impl Deadline<MonotonicClock, Yield> {
    /// Yield between attempts for at most `timeout`.
    pub fn after(timeout: Duration) -> Self {
        Self::with_clock(MonotonicClock, timeout, Yield)
    }
}

impl<C: TimeSource, W: WaitStrategy> Deadline<C, W> {
    /// Start the timeout now, as read from `clock`.
    pub fn with_clock(clock: C, timeout: Duration, inner: W) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            timeout,
            inner,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.duration_between(self.start, self.clock.now())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}

impl<C: TimeSource, W: WaitStrategy> WaitStrategy for Deadline<C, W> {
    fn wait(&mut self) -> bool {
        if self.is_expired() {
            return false;
        }
        self.inner.wait()
    }
}
