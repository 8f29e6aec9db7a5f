//! Published resources: a model with its resampler, a configured convolver.
//!
//! Stages are built and warmed up on the reconfiguration worker and then
//! handed to a [`ResourceSlot`](crate::ResourceSlot). Everything they need at
//! process time is allocated in `build` or `ensure_capacity`.

use crate::resample::LinearResampler;
use crate::traits::{Convolver, ConvolverFactory, Model, ModelFactory, Resampler, ResamplerFactory};
use crate::warmup;
use crate::{Error, Result};
use amprack_core::db_to_gain;
use std::path::Path;

/// Gain handed to `Convolver::configure`.
pub const IR_GAIN: f32 = 1.0;

/// Collaborator constructors supplied by the host integration.
#[derive(Clone)]
pub struct Factories {
    pub model: ModelFactory,
    pub convolver: ConvolverFactory,
    /// Falls back to [`LinearResampler`] when absent.
    pub resampler: Option<ResamplerFactory>,
}

impl Factories {
    pub fn new(model: ModelFactory, convolver: ConvolverFactory) -> Self {
        Self {
            model,
            convolver,
            resampler: None,
        }
    }

    pub fn with_resampler(mut self, resampler: ResamplerFactory) -> Self {
        self.resampler = Some(resampler);
        self
    }

    fn resampler(&self) -> Box<dyn Resampler> {
        match &self.resampler {
            Some(factory) => factory(),
            None => Box::new(LinearResampler::new()),
        }
    }
}

impl std::fmt::Debug for Factories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factories")
            .field("resampler", &self.resampler.is_some())
            .finish_non_exhaustive()
    }
}

/// Everything a build needs to know about the running engine.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub factories: &'a Factories,
    pub sample_rate: u32,
    /// Current host buffer size, used for convolver partitioning and warm-up.
    pub buffer_size: usize,
    /// Largest buffer a stage will be handed.
    pub capacity: usize,
    pub warmup_frames: usize,
    pub ir_normalize: bool,
}

impl BuildContext<'_> {
    fn block(&self) -> usize {
        if self.buffer_size == 0 {
            self.capacity
        } else {
            self.buffer_size.min(self.capacity)
        }
    }
}

/// Something a [`ResourceSlot`](crate::ResourceSlot) can hold.
pub trait Stage: Send + Sized + 'static {
    /// Construct, load, and warm up. Slow; reconfiguration worker only.
    fn build(path: &Path, ctx: &BuildContext<'_>) -> Result<Self>;

    /// Latency in engine-rate frames, measured during warm-up.
    fn latency(&self) -> usize;

    /// Grow internal scratch so buffers of `frames` can be processed.
    fn ensure_capacity(&mut self, _frames: usize) {}
}

/// A loaded model, optionally wrapped in its own resampler.
pub struct ModelStage {
    model: Box<dyn Model>,
    resampler: Option<Box<dyn Resampler>>,
    /// Model-rate scratch used when resampling.
    native: Vec<f32>,
    loudness: Option<f32>,
    latency: usize,
}

impl ModelStage {
    /// Process `buffer` in place. `normalize_to` is the loudness target in
    /// dB, applied when the model carries loudness metadata.
    #[inline]
    pub fn process(&mut self, buffer: &mut [f32], normalize_to: Option<f32>) {
        let Self {
            model,
            resampler,
            native,
            ..
        } = self;

        match resampler {
            None => model.process(buffer),
            Some(resampler) => {
                let n = resampler.up(buffer, native);
                model.process(&mut native[..n]);
                resampler.down(&native[..n], buffer);
            }
        }

        if let Some(target) = normalize_to {
            let gain = self.normalization_gain(target);
            if gain != 1.0 {
                buffer.iter_mut().for_each(|s| *s *= gain);
            }
        }
    }

    /// Linear gain bringing the model's loudness to `target_db`.
    pub fn normalization_gain(&self, target_db: f32) -> f32 {
        match self.loudness {
            Some(loudness) => db_to_gain(target_db - loudness),
            None => 1.0,
        }
    }

    pub fn loudness(&self) -> Option<f32> {
        self.loudness
    }

    pub fn is_resampled(&self) -> bool {
        self.resampler.is_some()
    }
}

impl Stage for ModelStage {
    fn build(path: &Path, ctx: &BuildContext<'_>) -> Result<Self> {
        let mut model = (ctx.factories.model)();
        model.load(path).map_err(|e| match e {
            Error::LoadFailed { .. } => e,
            other => Error::load_failed(path, other.to_string()),
        })?;

        let native_rate = model.expected_sample_rate();
        let resampler = if native_rate != 0 && native_rate != ctx.sample_rate {
            // Each model converts to its own native rate
            let mut resampler = ctx.factories.resampler();
            resampler.setup(ctx.sample_rate, native_rate);
            tracing::debug!(
                path = %path.display(),
                native_rate,
                engine_rate = ctx.sample_rate,
                "model resampled"
            );
            Some(resampler)
        } else {
            None
        };

        let mut stage = Self {
            loudness: model.loudness(),
            model,
            resampler,
            native: Vec::new(),
            latency: 0,
        };
        stage.ensure_capacity(ctx.capacity);

        let latency = warmup::measure_latency(ctx.warmup_frames, ctx.block(), |block| {
            stage.process(block, None)
        });
        stage.latency = latency;
        stage.model.reset();

        Ok(stage)
    }

    fn latency(&self) -> usize {
        self.latency
    }

    fn ensure_capacity(&mut self, frames: usize) {
        if let Some(resampler) = &self.resampler {
            let needed = resampler.output_capacity(frames);
            if self.native.len() < needed {
                self.native.resize(needed, 0.0);
            }
        }
    }
}

/// A configured convolver.
pub struct ConvolverStage {
    convolver: Box<dyn Convolver>,
    latency: usize,
}

impl ConvolverStage {
    #[inline]
    pub fn process(&mut self, buffer: &mut [f32]) {
        if self.convolver.is_runnable() {
            self.convolver.compute(buffer);
        }
    }
}

impl Stage for ConvolverStage {
    fn build(path: &Path, ctx: &BuildContext<'_>) -> Result<Self> {
        let mut convolver = (ctx.factories.convolver)();
        convolver.set_normalisation(ctx.ir_normalize);
        convolver
            .configure(path, IR_GAIN, ctx.block(), ctx.sample_rate)
            .map_err(|e| match e {
                Error::LoadFailed { .. } => e,
                other => Error::load_failed(path, other.to_string()),
            })?;

        if !convolver.is_runnable() {
            return Err(Error::NotRunnable(path.to_path_buf()));
        }

        let mut stage = Self {
            convolver,
            latency: 0,
        };
        let latency =
            warmup::measure_latency(ctx.warmup_frames, ctx.block(), |block| stage.process(block));
        stage.latency = latency;

        Ok(stage)
    }

    fn latency(&self) -> usize {
        self.latency
    }
}

/// Fixed-capacity delay used to align the two model paths.
#[derive(Debug, Clone)]
pub struct DelayLine {
    history: Vec<f32>,
    pos: usize,
    delay: usize,
}

impl DelayLine {
    pub fn new(max_delay: usize) -> Self {
        Self {
            history: vec![0.0; max_delay + 1],
            pos: 0,
            delay: 0,
        }
    }

    pub fn max_delay(&self) -> usize {
        self.history.len() - 1
    }

    /// Clamped to `max_delay`.
    pub fn set_delay(&mut self, delay: usize) {
        self.delay = delay.min(self.max_delay());
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn clear(&mut self) {
        self.history.fill(0.0);
    }

    #[inline]
    pub fn process(&mut self, buffer: &mut [f32]) {
        let len = self.history.len();
        for sample in buffer.iter_mut() {
            self.history[self.pos] = *sample;
            *sample = self.history[(self.pos + len - self.delay) % len];
            self.pos = (self.pos + 1) % len;
        }
    }
}

/// Pole of the DC blocker, about 38Hz at 48kHz.
const DC_POLE: f32 = 0.995;

/// Magnitudes below this are flushed to zero in recursive state.
const DENORMAL_FLOOR: f32 = 1e-20;

/// One-pole high-pass: `y[n] = x[n] - x[n-1] + R * y[n-1]`.
#[derive(Debug, Clone, Default)]
pub struct DcBlocker {
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }

    #[inline]
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            let x = *sample;
            let mut y = x - self.x1 + DC_POLE * self.y1;
            if y.abs() < DENORMAL_FLOOR {
                y = 0.0;
            }
            self.x1 = x;
            self.y1 = y;
            *sample = y;
        }
    }
}
