//! Per-stage counters.

use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter snapshot for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTiming {
    pub calls: u64,
    /// Fragments passed through or muted because the stage had no configuration.
    pub skipped: u64,
    pub faults: u64,
    /// Time spent in `process`; only accumulated while pipeline timing is on.
    pub total: Duration,
    pub peak: Duration,
    pub timed: u64,
}

impl StageTiming {
    pub fn average(&self) -> Duration {
        if self.timed == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.timed);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Lock-free counters shared between a stage and its observers.
#[derive(Debug, Default)]
pub struct StageStats {
    calls: AtomicU64,
    skipped: AtomicU64,
    faults: AtomicU64,
    total_nanos: AtomicU64,
    peak_nanos: AtomicU64,
    timed: AtomicU64,
}

impl StageStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.peak_nanos.fetch_max(nanos, Ordering::Relaxed);
        self.timed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StageTiming {
        StageTiming {
            calls: self.calls.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed)),
            peak: Duration::from_nanos(self.peak_nanos.load(Ordering::Relaxed)),
            timed: self.timed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
        self.total_nanos.store(0, Ordering::Relaxed);
        self.peak_nanos.store(0, Ordering::Relaxed);
        self.timed.store(0, Ordering::Relaxed);
    }
}
