use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Time source used to pace simulated conveyors and to measure loop latency.
///
/// Sorting decisions never depend on it: the encoder phase is the only clock
/// the real-time path follows.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Microseconds elapsed since `epoch`, saturating at 0.
    fn us_since(&self, epoch: Instant) -> u64 {
        let us = self.now().saturating_duration_since(epoch).as_micros();
        us.min(u128::from(u64::MAX)) as u64
    }
}

/// Wall-clock time backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

/// Manually advanced clock; `sleep` moves time forward without blocking.
///
/// Clones share the same timeline, so a test can hand one copy to a pump
/// thread and inspect elapsed time through another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
