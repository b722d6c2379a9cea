//! Time sources for the animation thread.
//!
//! The state machine needs two clocks: a monotonic one for hold deadlines
//! and idle timeouts, and the local wall clock for the sleep schedule.
//! [`Clock`] bundles both so tests can drive time by hand with
//! [`ManualClock`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::components::sleepwindow::ClockTime;

pub trait Clock: Send + Sync {
    /// Monotonic now.
    fn now(&self) -> Instant;
    /// Local time of day.
    fn local_time(&self) -> ClockTime;
}

/// The real clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_time(&self) -> ClockTime {
        ClockTime::from_naive(Local::now().time())
    }
}

#[derive(Debug, Clone, Copy)]
struct ManualTime {
    now: Instant,
    local: ClockTime,
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualTime>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Starts at the current instant and at noon.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ManualTime {
                now: Instant::now(),
                local: ClockTime::new(12, 0).unwrap_or_default(),
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ManualTime) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn advance(&self, by: Duration) {
        self.with(|t| t.now += by);
    }

    pub fn set_local_time(&self, time: ClockTime) {
        self.with(|t| t.local = time);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.with(|t| t.now)
    }

    fn local_time(&self) -> ClockTime {
        self.with(|t| t.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[test]
    fn test_manual_clock_local_time() {
        let clock = ManualClock::new();
        assert_eq!(clock.local_time().to_string(), "12:00");
        clock.set_local_time(ClockTime::new(23, 30).unwrap());
        assert_eq!(clock.local_time().hour(), 23);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
