//! Playback framerate sampling

use std::time::{Duration, Instant};

/// Average rate of published frames, refreshed once per interval
#[derive(Debug, Clone)]
pub struct FramerateTracker {
    interval: Duration,
    window_start: Option<Instant>,
    frames_in_window: u32,
    rate: f64,
}

impl FramerateTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: None,
            frames_in_window: 0,
            rate: 0.0,
        }
    }

    /// Record a frame published at `now`
    pub fn record(&mut self, now: Instant) {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return;
        };

        self.frames_in_window += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.interval && !elapsed.is_zero() {
            self.rate = self.frames_in_window as f64 / elapsed.as_secs_f64();
            self.frames_in_window = 0;
            self.window_start = Some(now);
        }
    }

    /// Frames per second over the last full interval, 0 until one completes
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.frames_in_window = 0;
        self.rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_after_full_interval() {
        let mut tracker = FramerateTracker::new(Duration::from_secs(1));
        let start = Instant::now();
        tracker.record(start);
        for i in 1..=30u64 {
            tracker.record(start + Duration::from_millis(i * 1000 / 30));
        }
        assert!((tracker.rate() - 30.0).abs() < 0.5);
    }

    #[test]
    fn test_rate_is_zero_before_interval_elapses() {
        let mut tracker = FramerateTracker::new(Duration::from_secs(1));
        let start = Instant::now();
        tracker.record(start);
        tracker.record(start + Duration::from_millis(100));
        assert_eq!(tracker.rate(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut tracker = FramerateTracker::new(Duration::from_millis(10));
        let start = Instant::now();
        tracker.record(start);
        tracker.record(start + Duration::from_millis(20));
        assert!(tracker.rate() > 0.0);
        tracker.reset();
        assert_eq!(tracker.rate(), 0.0);
    }
}
