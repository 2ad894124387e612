//! Callback load tracking against the fragment deadline.

use atomic_float::AtomicF32;
use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Deadline metrics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeadlineMetrics {
    /// Load in percent of the deadline.
    pub average: f32,
    pub peak: f32,
    pub current: f32,
    /// Cycles that took longer than their deadline.
    pub misses: u64,
    pub cycles: u64,
}

/// Load meter for the audio callback.
///
/// `record` only touches atomics and can be called from the audio thread.
#[derive(Debug)]
pub struct DeadlineMeter {
    current: AtomicF32,
    peak: AtomicF32,
    average: AtomicF32,
    misses: AtomicU64,
    cycles: AtomicU64,
    samples: AtomicU32,
    enabled: AtomicBool,
}

impl DeadlineMeter {
    pub fn new() -> Self {
        Self {
            current: AtomicF32::new(0.0),
            peak: AtomicF32::new(0.0),
            average: AtomicF32::new(0.0),
            misses: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            samples: AtomicU32::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record one cycle that took `elapsed` against a budget of `deadline`.
    pub fn record(&self, elapsed: Duration, deadline: Duration) {
        if !self.is_enabled() || deadline.is_zero() {
            return;
        }

        let load = (elapsed.as_secs_f64() / deadline.as_secs_f64()) as f32;
        self.current.store(load, Ordering::Relaxed);

        if load > self.peak.load(Ordering::Relaxed) {
            self.peak.store(load, Ordering::Relaxed);
        }

        // Exponential moving average
        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.load(Ordering::Relaxed);
        self.average
            .store(avg * (1.0 - alpha) + load * alpha, Ordering::Relaxed);

        self.cycles.fetch_add(1, Ordering::Relaxed);
        if elapsed > deadline {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn metrics(&self) -> DeadlineMetrics {
        DeadlineMetrics {
            average: self.average.load(Ordering::Relaxed) * 100.0,
            peak: self.peak.load(Ordering::Relaxed) * 100.0,
            current: self.current.load(Ordering::Relaxed) * 100.0,
            misses: self.misses(),
            cycles: self.cycles.load(Ordering::Relaxed),
        }
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn peak_percent(&self) -> f32 {
        self.peak.load(Ordering::Relaxed) * 100.0
    }

    pub fn reset(&self) {
        self.current.store(0.0, Ordering::Relaxed);
        self.peak.store(0.0, Ordering::Relaxed);
        self.average.store(0.0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.cycles.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}

impl Default for DeadlineMeter {
    fn default() -> Self {
        Self::new()
    }
}
