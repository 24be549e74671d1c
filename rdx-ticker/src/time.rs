//! The monotonic time source the driver measures elapsed time against.

use std::time::{Duration, Instant};

/// A monotonic clock reporting time elapsed since its own epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// The production clock, backed by `Instant`. Its epoch is the moment it was
/// created, which for a `TickerService` is the service's construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
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
        self.epoch.elapsed()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;

    pub struct FakeClock {
        current: Mutex<Duration>,
    }

    impl FakeClock {
        pub fn new(start: Duration) -> Self {
            Self {
                current: Mutex::new(start),
            }
        }

        pub fn advance(&self, duration: Duration) {
            let mut guard = self.current.lock();
            *guard += duration;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Duration {
            *self.current.lock()
        }
    }

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new(Duration::from_millis(5));
        clock.advance(Duration::from_millis(10));
        assert_eq!(Duration::from_millis(15), clock.now());
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
