//! Engine-wide counters and request flags.
//!
//! Written by the audio thread (requests, xruns, buffer size), the GUI thread
//! (requests) and the reconfiguration worker (clears requests, buffer
//! readiness). Every field is an atomic; the UI gets read-only snapshots.

use crate::slot::SlotId;
use amprack_core::{AtomicFlag, LoadMetrics};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Reload bit asking the reconfiguration worker to grow scratch and double
/// buffers to the current buffer size.
pub const REALLOCATE: u8 = 16;

/// Bits of every slot.
pub const ALL_SLOTS: u8 = 1 | 2 | 4 | 8;

#[derive(Debug)]
pub struct EngineState {
    /// A reconfiguration is pending.
    execute_requested: AtomicFlag,
    /// Double buffer and scratch are allocated for the current buffer size.
    buffer_ready: AtomicFlag,
    /// Which slots (plus [`REALLOCATE`]) need the reconfiguration worker.
    pending: AtomicU8,
    /// Slots to rebuild even if their path did not change.
    forced: AtomicU8,
    xruns: AtomicU64,
    reconfigurations: AtomicU64,
    buffer_size: AtomicUsize,
    capacity: AtomicUsize,
    sample_rate: AtomicU32,
    latency: AtomicUsize,
}

impl EngineState {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        Self {
            execute_requested: AtomicFlag::new(false),
            buffer_ready: AtomicFlag::new(true),
            pending: AtomicU8::new(0),
            forced: AtomicU8::new(0),
            xruns: AtomicU64::new(0),
            reconfigurations: AtomicU64::new(0),
            buffer_size: AtomicUsize::new(0),
            capacity: AtomicUsize::new(capacity),
            sample_rate: AtomicU32::new(sample_rate),
            latency: AtomicUsize::new(0),
        }
    }

    /// Queue `bits` for the reconfiguration worker. The caller wakes it.
    #[inline]
    pub fn request(&self, bits: u8) {
        self.pending.fetch_or(bits, Ordering::AcqRel);
        self.execute_requested.set(true);
    }

    /// Queue `bits` and rebuild them even when unchanged.
    #[inline]
    pub fn request_forced(&self, bits: u8) {
        self.forced.fetch_or(bits, Ordering::AcqRel);
        self.request(bits);
    }

    pub fn request_slot(&self, slot: SlotId) {
        self.request(slot.bit());
    }

    /// Consume every pending request: `(bits, forced_bits)`.
    ///
    /// `execute_requested` stays set until
    /// [`finish_reconfiguration`](Self::finish_reconfiguration).
    pub fn take_pending(&self) -> (u8, u8) {
        let forced = self.forced.swap(0, Ordering::AcqRel);
        let bits = self.pending.swap(0, Ordering::AcqRel);
        (bits, forced & bits)
    }

    /// Clear `execute_requested` once the worker has drained everything.
    /// Returns true if a request slipped in meanwhile; the flag is then set
    /// again and the worker goes another round.
    pub(crate) fn finish_reconfiguration(&self) -> bool {
        self.execute_requested.set(false);
        if self.pending() == 0 {
            return false;
        }
        self.execute_requested.set(true);
        true
    }

    pub fn execute_requested(&self) -> bool {
        self.execute_requested.get()
    }

    pub fn pending(&self) -> u8 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn buffer_ready(&self) -> bool {
        self.buffer_ready.get()
    }

    pub(crate) fn set_buffer_ready(&self, ready: bool) {
        self.buffer_ready.set(ready);
    }

    /// Add `count` deadline misses, returning the new total.
    #[inline]
    pub fn record_xruns(&self, count: u64) -> u64 {
        self.xruns.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn xruns(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }

    pub(crate) fn record_reconfiguration(&self) {
        self.reconfigurations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconfigurations(&self) -> u64 {
        self.reconfigurations.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.load(Ordering::Acquire)
    }

    /// Store the host buffer size, returning the previous one.
    pub(crate) fn swap_buffer_size(&self, frames: usize) -> usize {
        self.buffer_size.swap(frames, Ordering::AcqRel)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub(crate) fn set_capacity(&self, frames: usize) {
        self.capacity.store(frames, Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub(crate) fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Release);
    }

    /// Reported processing latency in samples.
    pub fn latency(&self) -> usize {
        self.latency.load(Ordering::Acquire)
    }

    /// Returns true if the value changed.
    pub(crate) fn set_latency(&self, samples: usize) -> bool {
        self.latency.swap(samples, Ordering::AcqRel) != samples
    }
}

/// Read-only snapshot for the UI.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub xruns: u64,
    /// Completed reconfiguration passes.
    pub reconfigurations: u64,
    /// Resources successfully built, across all slots.
    pub builds: u64,
    pub buffer_size: usize,
    pub capacity: usize,
    pub latency: usize,
    pub load: LoadMetrics,
}
