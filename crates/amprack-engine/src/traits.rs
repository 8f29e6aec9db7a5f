//! Collaborator abstractions: neural models, convolution engines, resamplers.
//!
//! The engine never looks inside these. Implementations are created by a
//! factory on the reconfiguration worker, which is also the only thread that
//! loads, warms up and drops them. After publication they are driven from the
//! audio thread or a real-time helper, one thread at a time.

use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// A neural amplifier model (NAM, RTNeural, ...).
///
/// Construction and `load` may be slow and allocate freely. `process` runs on
/// a real-time thread and must not allocate or block.
pub trait Model: Send {
    /// Load weights from `path`.
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Clear internal state (recurrent cells, filter memories).
    fn reset(&mut self);

    /// Process `buffer` in place at the model's native rate.
    fn process(&mut self, buffer: &mut [f32]);

    /// Native sample rate, or 0 if the model runs at any rate.
    fn expected_sample_rate(&self) -> u32;

    /// Output loudness in dB, if the model file carries it.
    fn loudness(&self) -> Option<f32> {
        None
    }
}

/// A convolution engine for cabinet impulse responses.
pub trait Convolver: Send {
    /// Load the impulse response at `path` and prepare partitions for
    /// `buffer_size` frames at `sample_rate`.
    fn configure(
        &mut self,
        path: &Path,
        gain: f32,
        buffer_size: usize,
        sample_rate: u32,
    ) -> Result<()>;

    /// Convolve `buffer` in place.
    fn compute(&mut self, buffer: &mut [f32]);

    fn is_runnable(&self) -> bool;

    /// Normalise the impulse response energy. Applied by the next `configure`.
    fn set_normalisation(&mut self, enabled: bool);
}

/// Sample-rate converter bridging the engine rate and a resource's native rate.
pub trait Resampler: Send {
    /// `engine_rate` is the rate of the buffers passed to `up`,
    /// `native_rate` the rate the wrapped resource expects.
    fn setup(&mut self, engine_rate: u32, native_rate: u32);

    /// Largest `up` output for `frames` input frames.
    fn output_capacity(&self, frames: usize) -> usize;

    /// Engine rate to native rate. Returns the number of frames written.
    fn up(&mut self, input: &[f32], output: &mut [f32]) -> usize;

    /// Native rate back to engine rate, filling exactly `output.len()` frames.
    fn down(&mut self, input: &[f32], output: &mut [f32]);
}

pub type ModelFactory = Arc<dyn Fn() -> Box<dyn Model> + Send + Sync>;

pub type ConvolverFactory = Arc<dyn Fn() -> Box<dyn Convolver> + Send + Sync>;

pub type ResamplerFactory = Arc<dyn Fn() -> Box<dyn Resampler> + Send + Sync>;
