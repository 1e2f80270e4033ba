//! Sliding-window error detector.
//!
//! # Responsibilities
//! - Remember the outcome of the last N attempts against one server
//! - Expose the number of healthy outcomes in the window
//! - Flag servers whose error ratio crosses a threshold

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::health::TrackerError;

/// Error ratio (in percent) above which a server has too many errors.
pub const DEFAULT_ERRORS_THRESHOLD_PERCENT: usize = 20;

struct ErrorRing {
    errors: Vec<bool>,
    position: usize,
}

/// Circular window of binary outcomes with a running error count.
pub struct DowntimeDetector {
    window: usize,
    errors_threshold_percent: usize,
    ring: Mutex<ErrorRing>,
    /// Always equal to the number of `true` slots in `ring.errors`.
    errors_count: AtomicUsize,
}

impl DowntimeDetector {
    /// Create a detector whose window starts fully healthy.
    pub fn new(window: usize) -> Result<Self, TrackerError> {
        Self::with_live_percent(window, 100)
    }

    /// Create a detector whose window starts with `live_percent` healthy slots.
    ///
    /// The error slots sit at the front of the ring, so they are the first
    /// ones overwritten by new outcomes.
    pub fn with_live_percent(window: usize, live_percent: usize) -> Result<Self, TrackerError> {
        if window == 0 {
            return Err(TrackerError::InvalidWindow(window));
        }
        if live_percent > 100 {
            return Err(TrackerError::InvalidPercent(live_percent));
        }

        let initial_errors = window - window * live_percent / 100;
        let errors = (0..window).map(|slot| slot < initial_errors).collect();

        Ok(Self {
            window,
            errors_threshold_percent: DEFAULT_ERRORS_THRESHOLD_PERCENT,
            ring: Mutex::new(ErrorRing { errors, position: 0 }),
            errors_count: AtomicUsize::new(initial_errors),
        })
    }

    /// Override the error ratio threshold used by [`Self::too_much_errors`].
    pub fn with_errors_threshold(mut self, percent: usize) -> Result<Self, TrackerError> {
        if percent > 100 {
            return Err(TrackerError::InvalidPercent(percent));
        }
        self.errors_threshold_percent = percent;
        Ok(self)
    }

    /// Record a failed attempt.
    pub fn failed(&self) {
        self.record(true);
    }

    /// Record a successful attempt.
    pub fn success(&self) {
        self.record(false);
    }

    fn record(&self, is_error: bool) {
        let mut ring = self.ring.lock().expect("downtime detector mutex poisoned");
        let position = ring.position;
        let previous = std::mem::replace(&mut ring.errors[position], is_error);

        match (previous, is_error) {
            (false, true) => {
                self.errors_count.fetch_add(1, Ordering::Release);
            }
            (true, false) => {
                self.errors_count.fetch_sub(1, Ordering::Release);
            }
            _ => {}
        }

        ring.position = (position + 1) % self.window;
    }

    /// Number of failed outcomes in the window.
    pub fn errors_count(&self) -> usize {
        self.errors_count.load(Ordering::Acquire)
    }

    /// Number of healthy outcomes in the window.
    pub fn success_count(&self) -> usize {
        self.window - self.errors_count()
    }

    /// True when the error ratio exceeds the configured threshold.
    pub fn too_much_errors(&self) -> bool {
        self.errors_count() * 100 > self.window * self.errors_threshold_percent
    }

    /// Size of the sliding window.
    pub fn window(&self) -> usize {
        self.window
    }
}

impl std::fmt::Debug for DowntimeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DowntimeDetector")
            .field("window", &self.window)
            .field("errors_count", &self.errors_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_reduce_success_count() {
        let detector = DowntimeDetector::new(10).unwrap();
        for _ in 0..4 {
            detector.failed();
        }
        assert_eq!(detector.errors_count(), 4);
        assert_eq!(detector.success_count(), 6);
    }

    #[test]
    fn test_errors_never_exceed_window() {
        let detector = DowntimeDetector::new(5).unwrap();
        for i in 0..50 {
            if i % 2 == 0 {
                detector.failed();
            } else {
                detector.success();
            }
            assert!(detector.errors_count() <= 5);
        }

        for _ in 0..12 {
            detector.failed();
        }
        assert_eq!(detector.errors_count(), 5);
        assert_eq!(detector.success_count(), 0);
    }

    #[test]
    fn test_old_outcomes_slide_out() {
        let detector = DowntimeDetector::new(3).unwrap();
        detector.failed();
        detector.failed();
        detector.failed();
        assert_eq!(detector.errors_count(), 3);

        detector.success();
        assert_eq!(detector.errors_count(), 2);
        detector.success();
        detector.success();
        assert_eq!(detector.errors_count(), 0);
    }

    #[test]
    fn test_live_percent_seed() {
        let detector = DowntimeDetector::with_live_percent(100, 10).unwrap();
        assert_eq!(detector.success_count(), 10);

        // seeded errors are overwritten first
        detector.success();
        assert_eq!(detector.success_count(), 11);
    }

    #[test]
    fn test_too_much_errors() {
        let detector = DowntimeDetector::new(10).unwrap();
        detector.failed();
        detector.failed();
        assert!(!detector.too_much_errors());
        detector.failed();
        assert!(detector.too_much_errors());
    }

    #[test]
    fn test_invalid_window() {
        assert_eq!(
            DowntimeDetector::new(0).unwrap_err(),
            TrackerError::InvalidWindow(0)
        );
        assert!(DowntimeDetector::with_live_percent(10, 101).is_err());
    }
}
