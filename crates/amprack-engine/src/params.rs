//! Host/GUI parameters, read once per processing cycle.

use crate::slot::SlotId;
use amprack_core::{AtomicFlag, AtomicFloat};
use std::sync::atomic::{AtomicIsize, Ordering};

/// Longest extra delay, in samples, between the two model paths.
pub const MAX_DELAY: usize = 4096;

pub const MIN_GAIN_DB: f32 = -60.0;
pub const MAX_GAIN_DB: f32 = 24.0;

/// Parameter block shared between the GUI and the audio thread.
///
/// Gains are in dB and smoothed by the pipeline. `blend` balances model A
/// (0.0) against model B (1.0); `mix` does the same for IR 1 and IR 2.
///
/// `delay` shifts model B against model A: positive values delay B,
/// negative values delay A. With phase correction on, the difference of the
/// measured model latencies is added on top.
#[derive(Debug)]
pub struct EngineParams {
    input_gain_db: AtomicFloat,
    output_gain_db: AtomicFloat,
    model_a_input_gain_db: AtomicFloat,
    model_b_input_gain_db: AtomicFloat,
    blend: AtomicFloat,
    mix: AtomicFloat,
    delay: AtomicIsize,
    phase_correction: AtomicFlag,
    dc_block: AtomicFlag,
    bypass: AtomicFlag,
    slot_bypass: [AtomicFlag; 4],
    normalize: AtomicFlag,
    ir_normalize: AtomicFlag,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            input_gain_db: AtomicFloat::new(0.0),
            output_gain_db: AtomicFloat::new(0.0),
            model_a_input_gain_db: AtomicFloat::new(0.0),
            model_b_input_gain_db: AtomicFloat::new(0.0),
            blend: AtomicFloat::new(0.5),
            mix: AtomicFloat::new(0.5),
            delay: AtomicIsize::new(0),
            phase_correction: AtomicFlag::new(true),
            dc_block: AtomicFlag::new(false),
            bypass: AtomicFlag::new(false),
            slot_bypass: Default::default(),
            normalize: AtomicFlag::new(false),
            ir_normalize: AtomicFlag::new(false),
        }
    }
}

impl EngineParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_gain_db(&self) -> f32 {
        self.input_gain_db.get()
    }

    pub fn set_input_gain_db(&self, db: f32) {
        self.input_gain_db.set_clamped(db, MIN_GAIN_DB, MAX_GAIN_DB);
    }

    pub fn output_gain_db(&self) -> f32 {
        self.output_gain_db.get()
    }

    pub fn set_output_gain_db(&self, db: f32) {
        self.output_gain_db.set_clamped(db, MIN_GAIN_DB, MAX_GAIN_DB);
    }

    /// Gain in front of model A only.
    pub fn model_a_input_gain_db(&self) -> f32 {
        self.model_a_input_gain_db.get()
    }

    pub fn set_model_a_input_gain_db(&self, db: f32) {
        self.model_a_input_gain_db
            .set_clamped(db, MIN_GAIN_DB, MAX_GAIN_DB);
    }

    /// Gain in front of model B only.
    pub fn model_b_input_gain_db(&self) -> f32 {
        self.model_b_input_gain_db.get()
    }

    pub fn set_model_b_input_gain_db(&self, db: f32) {
        self.model_b_input_gain_db
            .set_clamped(db, MIN_GAIN_DB, MAX_GAIN_DB);
    }

    pub fn blend(&self) -> f32 {
        self.blend.get()
    }

    pub fn set_blend(&self, blend: f32) {
        self.blend.set_clamped(blend, 0.0, 1.0);
    }

    pub fn mix(&self) -> f32 {
        self.mix.get()
    }

    pub fn set_mix(&self, mix: f32) {
        self.mix.set_clamped(mix, 0.0, 1.0);
    }

    /// Offset of model B against model A, in samples.
    pub fn delay(&self) -> isize {
        self.delay.load(Ordering::Relaxed)
    }

    /// Clamped to `±MAX_DELAY`.
    pub fn set_delay(&self, samples: isize) {
        let limit = MAX_DELAY as isize;
        self.delay
            .store(samples.clamp(-limit, limit), Ordering::Relaxed);
    }

    /// Align the two models by their measured latencies.
    pub fn phase_correction(&self) -> bool {
        self.phase_correction.get()
    }

    pub fn set_phase_correction(&self, enabled: bool) {
        self.phase_correction.set(enabled);
    }

    /// High-pass the model output to remove DC offset.
    pub fn dc_block(&self) -> bool {
        self.dc_block.get()
    }

    pub fn set_dc_block(&self, enabled: bool) {
        self.dc_block.set(enabled);
    }

    pub fn bypass(&self) -> bool {
        self.bypass.get()
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.set(bypass);
    }

    pub fn slot_bypassed(&self, slot: SlotId) -> bool {
        self.slot_bypass[slot.index()].get()
    }

    pub fn set_slot_bypass(&self, slot: SlotId, bypass: bool) {
        self.slot_bypass[slot.index()].set(bypass);
    }

    pub fn normalize(&self) -> bool {
        self.normalize.get()
    }

    pub fn set_normalize(&self, enabled: bool) {
        self.normalize.set(enabled);
    }

    /// Read when a convolver is configured. Use
    /// [`EngineHandle::set_ir_normalize`](crate::EngineHandle::set_ir_normalize)
    /// to also rebuild the loaded impulse responses.
    pub fn ir_normalize(&self) -> bool {
        self.ir_normalize.get()
    }

    pub fn set_ir_normalize(&self, enabled: bool) {
        self.ir_normalize.set(enabled);
    }
}
