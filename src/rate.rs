//! Sliding-window event rate estimation.

use crate::clock::{Clock, SystemClock};

/// Default number of timestamps retained by a [`RateCounter`].
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// Default trailing window for [`RateCounter::eps`], in seconds.
pub const DEFAULT_WINDOW_SECS: f64 = 10.0;

/// Headroom the log may grow past `max_events` before it is truncated.
const TRUNCATE_SLACK: usize = 100;

/// Events-per-second estimator over a trailing window.
///
/// The log is truncated only once it overflows by [`TRUNCATE_SLACK`] entries,
/// so truncation cost is amortized across updates.
#[derive(Clone, Debug)]
pub struct RateCounter {
    start: Option<f64>,
    max_events: usize,
    timestamps: Vec<f64>,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::with_max_events(DEFAULT_MAX_EVENTS)
    }

    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            start: None,
            max_events: max_events.max(1),
            timestamps: Vec::with_capacity(max_events.max(1) + TRUNCATE_SLACK),
        }
    }

    pub fn start(&mut self) {
        self.start_at(SystemClock.now());
    }

    pub fn start_at(&mut self, t: f64) {
        self.start = Some(t);
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn update(&mut self) {
        self.update_at(SystemClock.now());
    }

    pub fn update_at(&mut self, t: f64) {
        self.timestamps.push(t);
        if self.timestamps.len() > self.max_events + TRUNCATE_SLACK {
            let excess = self.timestamps.len() - self.max_events;
            self.timestamps.drain(..excess);
        }
    }

    /// Events per second over the trailing `window` seconds.
    ///
    /// Returns `0.0` when the counter was never started or no time has elapsed.
    pub fn eps(&self, window: f64) -> f64 {
        self.eps_at(SystemClock.now(), window)
    }

    pub fn eps_at(&self, now: f64, window: f64) -> f64 {
        let Some(start) = self.start else {
            return 0.0;
        };
        let seconds = (now - start).min(window);
        if seconds <= 0.0 {
            return 0.0;
        }
        let cutoff = now - window;
        let count = self.timestamps.iter().filter(|&&t| t > cutoff).count();
        count as f64 / seconds
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_rate_over_window() {
        let mut counter = RateCounter::new();
        let t0 = 1_000.0;
        counter.start_at(t0);
        for i in 1..=500 {
            counter.update_at(t0 + i as f64 * 0.01);
        }
        let eps = counter.eps_at(t0 + 5.0, 5.0);
        assert!((eps - 100.0).abs() < 1.0, "eps was {eps}");
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let mut counter = RateCounter::new();
        counter.start_at(50.0);
        counter.update_at(50.0);
        assert_eq!(counter.eps_at(50.0, 10.0), 0.0);
    }

    #[test]
    fn unstarted_counter_reports_zero() {
        let mut counter = RateCounter::new();
        counter.update_at(1.0);
        counter.update_at(2.0);
        assert!(!counter.is_started());
        assert_eq!(counter.eps_at(3.0, 10.0), 0.0);
    }

    #[test]
    fn short_elapsed_uses_elapsed_as_denominator() {
        let mut counter = RateCounter::new();
        counter.start_at(0.0);
        for i in 1..=4 {
            counter.update_at(i as f64 * 0.5);
        }
        // 4 events over 2 seconds, window 10s.
        assert!((counter.eps_at(2.0, 10.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn log_is_truncated_after_overflow() {
        let mut counter = RateCounter::with_max_events(10);
        counter.start_at(0.0);
        for i in 0..110 {
            counter.update_at(i as f64);
        }
        assert_eq!(counter.len(), 110);
        counter.update_at(110.0);
        assert_eq!(counter.len(), 10);
    }
}
