//! Sliding-window latency tracker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::health::TrackerError;

struct SampleRing {
    samples: Vec<u64>,
    position: usize,
}

/// Circular window of latency samples (microseconds) with a running total.
pub struct ResponseTimeTracker {
    window: usize,
    ring: Mutex<SampleRing>,
    total: AtomicU64,
    filled: AtomicBool,
}

impl ResponseTimeTracker {
    /// Create an empty tracker. It stays in warm-up until `window` samples arrive.
    pub fn new(window: usize) -> Result<Self, TrackerError> {
        if window == 0 {
            return Err(TrackerError::InvalidWindow(window));
        }

        Ok(Self {
            window,
            ring: Mutex::new(SampleRing {
                samples: vec![0; window],
                position: 0,
            }),
            total: AtomicU64::new(0),
            filled: AtomicBool::new(false),
        })
    }

    /// Record one latency sample.
    pub fn time(&self, micros: u64) {
        let mut ring = self.ring.lock().expect("response time tracker mutex poisoned");
        let position = ring.position;
        let previous = std::mem::replace(&mut ring.samples[position], micros);

        // Writers are serialized by the ring mutex.
        let total = self.total.load(Ordering::Acquire) - previous + micros;
        self.total.store(total, Ordering::Release);

        ring.position = (position + 1) % self.window;
        if ring.position == 0 {
            self.filled.store(true, Ordering::Release);
        }
    }

    /// Mean latency over the window. Unfilled slots count as zero.
    pub fn mean(&self) -> u64 {
        self.total.load(Ordering::Acquire) / self.window as u64
    }

    /// True until the window has been filled once.
    pub fn is_warm_up(&self) -> bool {
        !self.filled.load(Ordering::Acquire)
    }

    /// Size of the sliding window.
    pub fn window(&self) -> usize {
        self.window
    }
}

impl std::fmt::Debug for ResponseTimeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseTimeTracker")
            .field("window", &self.window)
            .field("mean", &self.mean())
            .field("warm_up", &self.is_warm_up())
            .finish()
    }
}
