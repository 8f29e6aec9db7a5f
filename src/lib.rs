//! # amprack - Real-time Amp Engine
//!
//! Neural amp models and cabinet impulse responses that can be swapped while
//! audio keeps flowing.
//!
//! ## Architecture
//!
//! amprack is an umbrella crate that coordinates:
//! - **amprack-core** - bounded-wait worker threads, cycle rendezvous,
//!   lock-free parameters, configuration
//! - **amprack-engine** - resource slots, reload protocol, latency-free and
//!   buffered processing, UI events
//!
//! ## Quick Start
//!
//! ```ignore
//! use amprack::prelude::*;
//!
//! let mut engine = EngineBuilder::new()
//!     .sample_rate(48000)
//!     .model_factory(model_factory)
//!     .convolver_factory(convolver_factory)
//!     .build()?;
//!
//! // GUI thread
//! let handle = engine.handle();
//! handle.request_reload(SlotId::ModelA, "/presets/plexi.nam");
//! handle.request_reload(SlotId::Ir1, "/cabs/v30.wav");
//! handle.params().set_output_gain_db(-3.0);
//!
//! // audio callback
//! engine.process(&mut buffer);
//! ```
//!
//! ## Threads
//!
//! - the audio callback never waits longer than its bounded helper waits
//! - `amprack-helper-0` / `amprack-helper-1` run model B and IR 2 in parallel
//!   with model A and IR 1
//! - `amprack-reconfig` loads, warms up and drops models and IRs
//! - `amprack-buffered` runs the whole chain one buffer late in buffered mode

/// Re-export of amprack-core for direct access
pub use amprack_core as core;

/// Re-export of amprack-engine for direct access
pub use amprack_engine as engine;

pub use amprack_core::{
    db_to_gain, AtomicFlag, AtomicFloat, BoundedWorker, EngineConfig, LoadMeter, LoadMetrics,
    PriorityHint, ProcessingMode, Rendezvous, SchedPolicy, SmoothedValue, WorkerHandle,
    WorkerState,
};

pub use amprack_engine::{
    Convolver, ConvolverFactory, Engine, EngineEvent, EngineHandle, EngineParams, EngineStats,
    Factories, LinearResampler, Model, ModelFactory, Resampler, ResamplerFactory, SlotId,
    NONE_LABEL,
};

mod error;
pub use error::{Error, Result};

mod builder;
pub use builder::EngineBuilder;

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Engine, EngineBuilder, EngineHandle};

    pub use crate::{db_to_gain, EngineConfig, ProcessingMode, SchedPolicy};

    pub use crate::{EngineEvent, EngineParams, EngineStats, SlotId, NONE_LABEL};

    pub use crate::{
        Convolver, ConvolverFactory, Factories, Model, ModelFactory, Resampler, ResamplerFactory,
    };

    pub use crate::Error;

    pub use std::sync::Arc;
}
