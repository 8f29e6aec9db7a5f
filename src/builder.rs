//! Builder for configuring and constructing an [`Engine`].

use crate::{Error, Result};
use amprack_core::{EngineConfig, ProcessingMode, SchedPolicy};
use amprack_engine::{ConvolverFactory, Engine, Factories, ModelFactory, ResamplerFactory};
use std::time::Duration;
use tracing::{debug, warn};

/// Collects the engine configuration and the collaborator factories, then
/// creates and initialises the engine.
///
/// A model factory and a convolver factory are required. Without a resampler
/// factory, models whose native rate differs from the engine rate go through
/// the built-in linear resampler.
///
/// # Example
///
/// ```ignore
/// use amprack::prelude::*;
///
/// let mut engine = EngineBuilder::new()
///     .sample_rate(48000)
///     .max_buffer_size(512)
///     .model_factory(Arc::new(|| Box::new(NamModel::default())))
///     .convolver_factory(Arc::new(|| Box::new(PartitionedConvolver::default())))
///     .build()?;
///
/// let handle = engine.handle();
/// handle.request_reload(SlotId::ModelA, "/presets/plexi.nam");
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    model: Option<ModelFactory>,
    convolver: Option<ConvolverFactory>,
    resampler: Option<ResamplerFactory>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 48000
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Default: 1024
    pub fn max_buffer_size(mut self, frames: usize) -> Self {
        self.config.max_buffer_size = frames;
        self
    }

    /// Default: [`ProcessingMode::LatencyFree`]
    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Default: true
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Override the helper timeout derived from the buffer period.
    pub fn helper_timeout(mut self, timeout: Duration) -> Self {
        self.config.helper_timeout_us = Some(timeout.as_micros() as u64);
        self
    }

    pub fn priority(mut self, priority: u8, policy: SchedPolicy) -> Self {
        self.config.priority = priority;
        self.config.policy = policy;
        self
    }

    pub fn warmup_frames(mut self, frames: usize) -> Self {
        self.config.warmup_frames = frames;
        self
    }

    pub fn model_factory(mut self, factory: ModelFactory) -> Self {
        self.model = Some(factory);
        self
    }

    pub fn convolver_factory(mut self, factory: ConvolverFactory) -> Self {
        self.convolver = Some(factory);
        self
    }

    pub fn resampler_factory(mut self, factory: ResamplerFactory) -> Self {
        self.resampler = Some(factory);
        self
    }

    /// Create the engine and start its workers.
    pub fn build(self) -> Result<Engine> {
        let (Some(model), Some(convolver)) = (self.model, self.convolver) else {
            warn!("engine builder is missing a collaborator factory");
            return Err(Error::Builder(
                "model and convolver factories are required".to_string(),
            ));
        };

        let mut factories = Factories::new(model, convolver);
        if let Some(resampler) = self.resampler {
            factories = factories.with_resampler(resampler);
        }

        let config = self.config;
        let (sample_rate, priority, policy) = (config.sample_rate, config.priority, config.policy);
        debug!(
            sample_rate,
            max_buffer_size = config.max_buffer_size,
            mode = ?config.mode,
            parallel = config.parallel,
            "Building engine"
        );

        let mut engine = Engine::new(config, factories)?;
        engine.init(sample_rate, priority, policy)?;
        Ok(engine)
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("convolver", &self.convolver.is_some())
            .field("resampler", &self.resampler.is_some())
            .finish()
    }
}
