//! Real-time pacing of recorded timestamps.
//!
//! An [`Anchor`] pins the first timestamp of a source to "now"; every later
//! timestamp is turned into a [`Delay`] relative to that anchor. A [`Waiter`]
//! then suspends the calling thread for that long.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of "now" in milliseconds.
///
/// Only differences between readings matter, so the epoch is arbitrary.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

/// Monotonic clock counting from its own creation.
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
    fn now_ms(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// What to do before releasing a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Already due; emit immediately.
    Due,
    /// Wait this long first.
    Wait(Duration),
}

/// Per-source mapping from recorded time to clock time.
///
/// Holds `base_time = now - first_timestamp`. Create one per source and drop
/// it when the source ends; anchors are never shared between sources.
#[derive(Debug)]
pub struct Anchor<C> {
    clock: C,
    base_time: i64,
}

impl<C: Clock> Anchor<C> {
    /// Anchors `first_timestamp` to the current clock reading.
    pub fn new(clock: C, first_timestamp: i64) -> Self {
        let base_time = clock.now_ms().saturating_sub(first_timestamp);
        tracing::debug!(first_timestamp, base_time, "anchored replay clock");
        Self { clock, base_time }
    }

    /// Time remaining until `timestamp` should be released.
    pub fn delay_until(&self, timestamp: i64) -> Delay {
        let elapsed = self.clock.now_ms().saturating_sub(self.base_time);
        let target = timestamp.saturating_sub(elapsed);
        match u64::try_from(target) {
            Ok(ms) if ms > 0 => Delay::Wait(Duration::from_millis(ms)),
            _ => Delay::Due,
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Blocking suspension of the emitting thread.
pub trait Waiter {
    fn wait(&self, duration: Duration) -> WaitOutcome;

    /// Whether waits have been cancelled for good.
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<T: Waiter + ?Sized> Waiter for &T {
    fn wait(&self, duration: Duration) -> WaitOutcome {
        (**self).wait(duration)
    }

    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Waiter that sleeps on a condition variable against a monotonic deadline
/// and can be woken early through a [`CancelHandle`].
#[derive(Debug, Clone, Default)]
pub struct CancellableWaiter {
    state: Arc<CancelState>,
}

/// Cancels every current and future wait of the waiter it came from.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancellableWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Waiter for CancellableWaiter {
    fn is_cancelled(&self) -> bool {
        *self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self, duration: Duration) -> WaitOutcome {
        let deadline = Instant::now() + duration;
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if *cancelled {
                return WaitOutcome::Cancelled;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitOutcome::Elapsed;
            }
            // Spurious wakeups fall through to the checks above.
            cancelled = self
                .state
                .wake
                .wait_timeout(cancelled, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.state.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::thread;

    use super::*;

    struct ManualClock(Cell<i64>);

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.get()
        }
    }

    #[test]
    fn test_first_timestamp_is_due_immediately() {
        let clock = ManualClock(Cell::new(5_000));
        let anchor = Anchor::new(&clock, 1_420_070_400_123);
        assert_eq!(anchor.delay_until(1_420_070_400_123), Delay::Due);
    }

    #[test]
    fn test_delay_tracks_recorded_spacing() {
        let clock = ManualClock(Cell::new(5_000));
        let anchor = Anchor::new(&clock, 1_420_070_400_123);

        assert_eq!(
            anchor.delay_until(1_420_070_402_123),
            Delay::Wait(Duration::from_millis(2_000))
        );

        clock.0.set(6_500);
        assert_eq!(
            anchor.delay_until(1_420_070_402_123),
            Delay::Wait(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_past_targets_are_due() {
        let clock = ManualClock(Cell::new(0));
        let anchor = Anchor::new(&clock, 1_000_000);

        clock.0.set(10_000);
        assert_eq!(anchor.delay_until(1_002_000), Delay::Due);
        assert_eq!(anchor.delay_until(1_010_000), Delay::Due);
        // Out-of-order timestamps are due too.
        assert_eq!(anchor.delay_until(999_000), Delay::Due);
    }

    #[test]
    fn test_monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_wait_zero_returns_immediately() {
        let waiter = CancellableWaiter::new();
        let start = Instant::now();
        assert_eq!(waiter.wait(Duration::ZERO), WaitOutcome::Elapsed);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_wait_sleeps_for_duration() {
        let waiter = CancellableWaiter::new();
        let start = Instant::now();
        assert_eq!(
            waiter.wait(Duration::from_millis(60)),
            WaitOutcome::Elapsed
        );
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_cancel_wakes_pending_wait() {
        let waiter = CancellableWaiter::new();
        let handle = waiter.cancel_handle();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.cancel();
        });

        let start = Instant::now();
        assert_eq!(
            waiter.wait(Duration::from_secs(30)),
            WaitOutcome::Cancelled
        );
        assert!(start.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
    }

    #[test]
    fn test_cancel_before_wait_returns_immediately() {
        let waiter = CancellableWaiter::new();
        waiter.cancel_handle().cancel();
        assert!(waiter.is_cancelled());
        assert_eq!(
            waiter.wait(Duration::from_secs(30)),
            WaitOutcome::Cancelled
        );
    }
}
