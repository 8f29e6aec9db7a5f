//! DSP load tracking for audio callbacks.

use crate::AtomicFloat;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Load metrics snapshot. Percentages are relative to the buffer period.
#[derive(Debug, Clone, Default)]
pub struct LoadMetrics {
    pub average: f32,
    pub peak: f32,
    pub current: f32,
    pub overruns: u64,
}

/// Callback load meter. `record` is RT-safe (atomics only).
#[derive(Debug)]
pub struct LoadMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    overruns: AtomicU64,
    samples: AtomicU32,
}

impl Default for LoadMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadMeter {
    pub fn new() -> Self {
        Self {
            current: AtomicFloat::new(0.0),
            peak: AtomicFloat::new(0.0),
            average: AtomicFloat::new(0.0),
            overruns: AtomicU64::new(0),
            samples: AtomicU32::new(0),
        }
    }

    /// Record one callback that took `elapsed` for a buffer lasting `period`.
    pub fn record(&self, elapsed: Duration, period: Duration) {
        if period.is_zero() {
            return;
        }
        let load = (elapsed.as_secs_f64() / period.as_secs_f64()) as f32;

        self.current.set(load);
        if load > self.peak.get() {
            self.peak.set(load);
        }

        // Exponential moving average
        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.get();
        self.average.set(avg * (1.0 - alpha) + load * alpha);

        if elapsed > period {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn metrics(&self) -> LoadMetrics {
        LoadMetrics {
            average: self.average.get() * 100.0,
            peak: self.peak.get() * 100.0,
            current: self.current.get() * 100.0,
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    pub fn average_percent(&self) -> f32 {
        self.average.get() * 100.0
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.overruns.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}
