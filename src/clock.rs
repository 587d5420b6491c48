//! Monotonic millisecond clocks for capture timing
//!
//! Profilers read the clock once at `start()` and compute every offset and
//! duration relative to that mark. The clock is a trait so tests and replay
//! tooling can drive time explicitly with [`ManualClock`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic time in milliseconds from an arbitrary origin
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> u64;

    /// Milliseconds elapsed since an earlier reading of this clock
    fn elapsed_since(&self, mark_ms: u64) -> u64 {
        self.now_ms().saturating_sub(mark_ms)
    }
}

/// Wall-independent clock backed by `std::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to
///
/// # Example
///
/// ```
/// use stepwatch::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let mark = clock.now_ms();
/// clock.advance(25);
/// assert_eq!(clock.elapsed_since(mark), 25);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.now_ms();
        assert!(b >= a + 4);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new();
        clock.advance(10);
        clock.advance(5);
        assert_eq!(clock.now_ms(), 15);
        clock.set(3);
        assert_eq!(clock.elapsed_since(1), 2);
        assert_eq!(clock.elapsed_since(10), 0);
    }
}
