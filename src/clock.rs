use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Mutex;
use std::time::Instant;

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync {
    fn wall(&self) -> DateTime<Utc>;
    /// Milliseconds on a monotonic timeline. Only differences are meaningful.
    fn monotonic_ms(&self) -> f64;
}

/// Production clock: chrono for wall time, `Instant` for the monotonic axis.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock for tests. Wall and monotonic time advance together.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<(DateTime<Utc>, f64)>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new((start, 0.0)),
        }
    }

    /// Starts at 2024-01-01T00:00:00Z.
    pub fn at_epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    pub fn advance_ms(&self, ms: u64) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.0 += ChronoDuration::milliseconds(ms as i64);
            guard.1 += ms as f64;
        }
    }
}

impl Clock for ManualClock {
    fn wall(&self) -> DateTime<Utc> {
        self.inner.lock().map(|g| g.0).unwrap_or_else(|p| p.into_inner().0)
    }

    fn monotonic_ms(&self) -> f64 {
        self.inner.lock().map(|g| g.1).unwrap_or_else(|p| p.into_inner().1)
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_millis(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_both_axes() {
        let clock = ManualClock::at_epoch();
        let wall_before = clock.wall();
        clock.advance_ms(1500);
        assert_eq!(clock.monotonic_ms(), 1500.0);
        assert_eq!((clock.wall() - wall_before).num_milliseconds(), 1500);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
    }

    #[test]
    fn iso_millis_matches_browser_format() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(iso_millis(t), "2024-03-09T07:05:01.000Z");
    }
}
