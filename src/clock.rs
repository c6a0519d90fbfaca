//! Monotonic time sources for the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Shared by the state machine, the producer and scripted inputs.
pub trait Clock: Send + Sync {
    /// Time since the clock's own epoch. Never decreases.
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);

    fn elapsed_since(&self, start: Duration) -> Duration {
        self.now().saturating_sub(start)
    }
}

#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d);
    }
}

/// Virtual time that only moves when someone sleeps on it. Replays and tests
/// run at full speed with deterministic timestamps.
#[derive(Debug, Clone, Default)]
pub struct SteppedClock {
    nanos: Arc<AtomicU64>,
}

impl SteppedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
        // let the other side of the pipeline run
        thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_clock_moves_only_on_sleep() {
        let c = SteppedClock::new();
        assert_eq!(c.now(), Duration::ZERO);
        c.sleep(Duration::from_millis(5));
        c.sleep(Duration::from_millis(5));
        assert_eq!(c.now(), Duration::from_millis(10));
        assert_eq!(c.elapsed_since(Duration::from_millis(4)), Duration::from_millis(6));
    }

    #[test]
    fn stepped_clock_clones_share_time() {
        let a = SteppedClock::new();
        let b = a.clone();
        a.advance(Duration::from_millis(3));
        assert_eq!(b.now(), Duration::from_millis(3));
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let c = MonotonicClock::new();
        let t0 = c.now();
        let t1 = c.now();
        assert!(t1 >= t0);
    }
}
