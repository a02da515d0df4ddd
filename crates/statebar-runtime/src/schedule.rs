#![forbid(unsafe_code)]

//! Fixed-period tick arithmetic for pollers.
//!
//! Ticks are measured from tick start to tick start. When an invocation
//! overruns one or more boundaries, those ticks are skipped, never queued,
//! and the schedule resumes at the first boundary that is not in the past.

use web_time::{Duration, Instant};

/// Tick boundaries of one poller.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    interval: Duration,
    next: Instant,
}

impl TickSchedule {
    /// Start a schedule at `start`. With `immediate`, the first tick is at
    /// `start`; otherwise one interval later.
    ///
    /// `interval` must be non-zero.
    #[must_use]
    pub fn new(start: Instant, interval: Duration, immediate: bool) -> Self {
        let next = if immediate { start } else { start + interval };
        Self { interval, next }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next invocation is due.
    #[must_use]
    pub fn next_tick(&self) -> Instant {
        self.next
    }

    /// Record that the invocation started at [`next_tick`](Self::next_tick)
    /// finished at `now`, and advance.
    ///
    /// Returns how many boundaries passed while the invocation was in flight.
    /// A boundary equal to `now` is not skipped; it fires immediately.
    pub fn complete(&mut self, now: Instant) -> u64 {
        let base = self.next + self.interval;
        if now <= base {
            self.next = base;
            return 0;
        }
        let interval_ns = self.interval.as_nanos().max(1);
        let skipped = (now - base).as_nanos().div_ceil(interval_ns);
        let advance = u64::try_from(skipped.saturating_mul(interval_ns)).unwrap_or(u64::MAX);
        self.next = base + Duration::from_nanos(advance);
        u64::try_from(skipped).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn immediate_first_tick_is_start() {
        let t0 = Instant::now();
        let s = TickSchedule::new(t0, SEC, true);
        assert_eq!(s.next_tick(), t0);
    }

    #[test]
    fn delayed_first_tick_is_one_interval_later() {
        let t0 = Instant::now();
        let s = TickSchedule::new(t0, SEC, false);
        assert_eq!(s.next_tick(), t0 + SEC);
    }

    #[test]
    fn period_is_measured_from_tick_start() {
        let t0 = Instant::now();
        let mut s = TickSchedule::new(t0, 10 * SEC, true);
        let skipped = s.complete(t0 + Duration::from_millis(300));
        assert_eq!(skipped, 0);
        assert_eq!(s.next_tick(), t0 + 10 * SEC);
    }

    #[test]
    fn overrun_skips_missed_boundaries() {
        let t0 = Instant::now();
        let mut s = TickSchedule::new(t0, SEC, true);
        // In flight from t0 until t0 + 3.5s: boundaries at 1s, 2s, 3s pass.
        let skipped = s.complete(t0 + Duration::from_millis(3500));
        assert_eq!(skipped, 3);
        assert_eq!(s.next_tick(), t0 + 4 * SEC);
    }

    #[test]
    fn completion_exactly_on_boundary_fires_it() {
        let t0 = Instant::now();
        let mut s = TickSchedule::new(t0, SEC, true);
        let skipped = s.complete(t0 + SEC);
        assert_eq!(skipped, 0);
        assert_eq!(s.next_tick(), t0 + SEC);
    }

    #[test]
    fn completion_just_past_boundary_skips_it() {
        let t0 = Instant::now();
        let mut s = TickSchedule::new(t0, SEC, true);
        let skipped = s.complete(t0 + SEC + Duration::from_millis(1));
        assert_eq!(skipped, 1);
        assert_eq!(s.next_tick(), t0 + 2 * SEC);
    }
}
