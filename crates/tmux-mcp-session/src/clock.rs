//! Time source for the polling loops.

use std::time::{Duration, Instant};

/// Monotonic time plus the ability to wait.
///
/// Waiters only ever observe time through this trait, so tests can drive
/// them with virtual time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by [`Instant::now`] and thread sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
