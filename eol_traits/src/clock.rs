use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Read-only monotonic time source for test durations. Sleeping goes
/// through `tokio::time` so paused-time tests stay deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Time since `start`; zero when `start` lies in the future.
    fn elapsed(&self, start: Instant) -> Duration {
        self.now().saturating_duration_since(start)
    }

    fn elapsed_ms(&self, start: Instant) -> u64 {
        u64::try_from(self.elapsed(start).as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Stands still until `advance` is called.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
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
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset = offset.saturating_add(by);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map_or(Duration::ZERO, |o| *o);
        self.start + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_advance() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.elapsed_ms(t0), 0);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.elapsed_ms(t0), 250);
        assert_eq!(clock.elapsed(t0), Duration::from_millis(250));
    }

    #[test]
    fn future_start_reads_as_zero() {
        let clock = ManualClock::new();
        let later = clock.now() + Duration::from_secs(5);
        assert_eq!(clock.elapsed_ms(later), 0);
    }
}
